// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote connection status.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    HostVerifying,
    Connected,
    Reconnecting,
    /// Automatic retries exhausted; only a manual connect leaves this state.
    Error,
}

crate::simple_display! {
    ConnectionStatus {
        Disconnected => "disconnected",
        Connecting => "connecting",
        Authenticating => "authenticating",
        HostVerifying => "host-verifying",
        Connected => "connected",
        Reconnecting => "reconnecting",
        Error => "error",
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// A handshake is underway.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::Authenticating
                | ConnectionStatus::HostVerifying
                | ConnectionStatus::Reconnecting
        )
    }
}
