//! # Network Module
//!
//! ## Why This Module Exists
//! The broker is only reachable once the terminal is associated with its WiFi network. This
//! module owns that first layer of connectivity: issuing the association, watching it
//! complete, and escalating to interactive re-provisioning when it does not.
//!
//! ## Module Architecture
//!
//! ```text
//! network/
//! ├── link_manager.rs  - Disconnected → Connecting → Connected, plus Recovery
//! └── driver.rs        - LinkDriver trait with nmcli and host-managed backends
//! ```
//!
//! [`ConnectionState`] is shared with the broker session so both layers report their
//! progress the same way.

pub mod driver;
pub mod link_manager;

use std::fmt;

/// Coarse connectivity state reported by the link manager and the broker session.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the operator to enter replacement settings.
    Recovery,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Recovery => "awaiting re-provisioning",
        };
        write!(f, "{}", text)
    }
}
