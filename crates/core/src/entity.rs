// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow entities (specs and bugs).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of tracked entity. The string form doubles as its directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Specs,
    Bugs,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Specs, EntityKind::Bugs];

    /// Directory name under the config dir (`.kiro/specs`, `.kiro/bugs`)
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Specs => "specs",
            EntityKind::Bugs => "bugs",
        }
    }

    /// Metadata file inside an entity directory
    pub fn metadata_file(&self) -> &'static str {
        match self {
            EntityKind::Specs => "spec.json",
            EntityKind::Bugs => "bug.json",
        }
    }
}

crate::simple_display! {
    EntityKind {
        Specs => "specs",
        Bugs => "bugs",
    }
}

/// Identifies one spec or bug within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityId {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    pub fn spec(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Specs, name)
    }

    pub fn bug(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Bugs, name)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityParseError {
    #[error("unknown entity kind: {0} (expected specs or bugs)")]
    UnknownKind(String),
    #[error("invalid entity name: {0:?}")]
    InvalidName(String),
}

/// Entity names become directory names; reject anything that could escape one.
pub fn is_valid_entity_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

impl FromStr for EntityKind {
    type Err = EntityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spec" | "specs" => Ok(EntityKind::Specs),
            "bug" | "bugs" => Ok(EntityKind::Bugs),
            other => Err(EntityParseError::UnknownKind(other.to_string())),
        }
    }
}

impl FromStr for EntityId {
    type Err = EntityParseError;

    /// Parses `kind/name`; a bare name is taken to be a spec.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = match s.split_once('/') {
            Some((kind, name)) => (kind.parse()?, name),
            None => (EntityKind::Specs, s),
        };
        if !is_valid_entity_name(name) {
            return Err(EntityParseError::InvalidName(name.to_string()));
        }
        Ok(EntityId::new(kind, name))
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
