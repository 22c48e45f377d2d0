//! Link-layer backends.
//!
//! The link manager never touches the network stack itself. It asks a [`LinkDriver`] to
//! associate and then polls [`LinkDriver::status`] until an address shows up.

use async_trait::async_trait;
use std::net::{IpAddr, UdpSocket};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("link unavailable: {0}")]
    Unavailable(String),
}

/// Snapshot of the association as seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Association issued, no address yet.
    Associating,
    /// Associated; the address is reported when the driver can determine it.
    Up(Option<IpAddr>),
    /// The last association attempt ended without a link.
    Failed(String),
    /// No association has been issued, or the link went away.
    Down,
}

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up(_))
    }
}

#[async_trait]
pub trait LinkDriver: Send {
    /// Starts associating; returns once the request is issued, not when it completes.
    async fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), LinkError>;

    async fn status(&mut self) -> LinkStatus;
}

/// Best-effort local address: the source address the kernel would pick for outbound traffic.
///
/// UDP `connect` only consults the routing table, nothing is sent.
pub fn local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Associates through NetworkManager's `nmcli`.
#[derive(Debug, Default)]
pub struct NmcliLink {
    interface: Option<String>,
    child: Option<Child>,
    associated: bool,
}

impl NmcliLink {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            interface,
            child: None,
            associated: false,
        }
    }
}

#[async_trait]
impl LinkDriver for NmcliLink {
    async fn associate(&mut self, ssid: &str, passphrase: Option<&str>) -> Result<(), LinkError> {
        if let Some(mut previous) = self.child.take() {
            debug!("Cancelling previous association attempt");
            if let Err(e) = previous.start_kill() {
                warn!("Failed to stop previous nmcli process: {}", e);
            }
        }
        self.associated = false;

        let mut cmd = Command::new("nmcli");
        cmd.args(["device", "wifi", "connect", ssid]);
        if let Some(pw) = passphrase {
            cmd.args(["password", pw]);
        }
        if let Some(iface) = &self.interface {
            cmd.args(["ifname", iface.as_str()]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        info!(
            "Associating with '{}' ({})",
            ssid,
            if passphrase.is_some() { "secured" } else { "open" }
        );
        let child = cmd.spawn().map_err(|source| LinkError::Spawn {
            program: "nmcli",
            source,
        })?;
        self.child = Some(child);
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => return LinkStatus::Associating,
                Ok(Some(exit)) => {
                    self.child = None;
                    if !exit.success() {
                        return LinkStatus::Failed(format!("nmcli exited with {}", exit));
                    }
                    self.associated = true;
                }
                Err(e) => {
                    self.child = None;
                    return LinkStatus::Failed(e.to_string());
                }
            }
        }

        if !self.associated {
            return LinkStatus::Down;
        }
        match local_address() {
            Some(addr) => LinkStatus::Up(Some(addr)),
            None => LinkStatus::Associating,
        }
    }
}

/// For hosts whose network is managed outside the terminal.
///
/// Association is a no-op; the link counts as up as soon as the host has a route.
#[derive(Debug, Default)]
pub struct HostLink;

#[async_trait]
impl LinkDriver for HostLink {
    async fn associate(&mut self, ssid: &str, _passphrase: Option<&str>) -> Result<(), LinkError> {
        debug!("Host-managed network, ignoring association request for '{}'", ssid);
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        match local_address() {
            Some(addr) => LinkStatus::Up(Some(addr)),
            None => LinkStatus::Associating,
        }
    }
}
