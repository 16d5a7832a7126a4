//! Device connectivity as reported by the host platform.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::NetworkType;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

impl From<String> for ConnectionKind {
    fn from(kind: String) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "wifi" => ConnectionKind::Wifi,
            "cellular" => ConnectionKind::Cellular,
            "ethernet" => ConnectionKind::Ethernet,
            _ => ConnectionKind::Unknown,
        }
    }
}

/// Snapshot of the device's network link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub online: bool,
    #[serde(default)]
    pub connection: ConnectionKind,
    /// Effective connection type, e.g. `4g` or `slow-2g`.
    #[serde(default)]
    pub effective_type: Option<String>,
    /// Estimated downlink bandwidth in Mbps.
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
}

impl Default for LinkReport {
    fn default() -> Self {
        Self {
            online: true,
            connection: ConnectionKind::Unknown,
            effective_type: None,
            downlink_mbps: None,
        }
    }
}

impl LinkReport {
    // ---
    pub fn network_type(&self) -> NetworkType {
        self.effective_type
            .as_deref()
            .map_or(NetworkType::Unknown, NetworkType::from_effective_type)
    }

    pub fn downlink(&self) -> Option<f64> {
        self.downlink_mbps.filter(|mbps| mbps.is_finite())
    }
}

/// Shared view of the device link. Starts online until told otherwise.
#[derive(Debug)]
pub struct DeviceLink {
    tx: watch::Sender<LinkReport>,
}

impl Default for DeviceLink {
    fn default() -> Self {
        Self::new(LinkReport::default())
    }
}

impl DeviceLink {
    // ---
    pub fn new(initial: LinkReport) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn is_wifi(&self) -> bool {
        self.tx.borrow().connection == ConnectionKind::Wifi
    }

    pub fn report(&self) -> LinkReport {
        self.tx.borrow().clone()
    }

    /// Replace the current report, returning the previous one.
    pub fn update(&self, report: LinkReport) -> LinkReport {
        self.tx.send_replace(report)
    }

    /// Change only the online flag.
    pub fn set_online(&self, online: bool) -> bool {
        let mut previous = online;
        self.tx.send_modify(|r| {
            previous = r.online;
            r.online = online;
        });
        previous
    }
}
