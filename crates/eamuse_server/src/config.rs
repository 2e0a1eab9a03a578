//! Per-request server configuration.
//!
//! The pipeline holds one base [`ServerConfig`] and clones it for every
//! request. Machine, client and arcade overrides are written to that clone
//! only.

use eamuse_data::ArcadeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: HostSettings,
    #[serde(default)]
    pub paseli: PaseliSettings,
    #[serde(default)]
    pub app: AppInfo,
    /// The cabinet this request came from. Set by dispatch.
    #[serde(skip)]
    pub machine: Option<MachineContext>,
    /// The network peer. Set by the transport layer.
    #[serde(skip)]
    pub client: Option<ClientContext>,
}

/// Where cabinets should reach this server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    pub host: String,
    pub port: u16,
}

/// PASELI (e-money) switches. Arcades override these per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaseliSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub infinite: bool,
}

/// Name and version shown on cabinet network screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "eamuse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineContext {
    pub pcbid: String,
    pub arcade: Option<ArcadeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub address: String,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            server: HostSettings {
                host: host.into(),
                port,
            },
            paseli: PaseliSettings::default(),
            app: AppInfo::default(),
            machine: None,
            client: None,
        }
    }

    /// Base URL advertised to cabinets.
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.server.host, self.server.port)
    }

    pub fn pcbid(&self) -> Option<&str> {
        self.machine.as_ref().map(|m| m.pcbid.as_str())
    }

    pub fn client_address(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.address.as_str())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 80)
    }
}
