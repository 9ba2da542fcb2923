// ── Runtime fleet configuration ──
//
// Validated, typed settings for one provisioning run. These types never
// touch disk: `tunnelfleet-config` loads and checks the YAML document,
// then hands a `FleetConfig` in.

use std::path::PathBuf;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const DEFAULT_TUNNEL_IMAGE: &str = "azinchen/nordvpn:latest";
pub const DEFAULT_PROXY_IMAGE: &str = "vimagick/tinyproxy";
pub const DEFAULT_OUTPUT_DIR: &str = "multi_proxy_setup";
pub const DEFAULT_MAX_ENDPOINTS: usize = 5;
pub const DEFAULT_FIREWALL_TOOL: &str = "ufw";

/// Tunnel technology passed to the tunnel image.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VpnProtocol {
    #[default]
    OpenvpnUdp,
    OpenvpnTcp,
    Nordlynx,
}

/// Tunnel provider credentials and endpoint choices.
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    pub user: String,
    pub secret: SecretString,
    pub protocol: VpnProtocol,
    /// Endpoint name -> enabled. Names outside the catalog are ignored.
    pub endpoints: IndexMap<String, bool>,
    /// Pick endpoints at random instead of honoring `endpoints`.
    pub random: bool,
    /// Seed for the random policy; `None` uses OS entropy.
    pub seed: Option<u64>,
    pub image: String,
    /// LAN range that bypasses the tunnel (e.g. `192.168.1.0/24`).
    pub network: Option<String>,
}

/// Fleet shape and the proxy credentials shared by every instance.
#[derive(Debug, Clone)]
pub struct FleetSettings {
    pub count: usize,
    pub base_port: u16,
    pub username: String,
    pub password: SecretString,
    pub max_endpoints_per_instance: usize,
    pub proxy_image: String,
    pub output_dir: PathBuf,
    /// Chain tunnel units so the runtime brings them up one at a time.
    pub stagger: bool,
}

#[derive(Debug, Clone)]
pub struct FirewallSettings {
    pub enable: bool,
    pub tool: String,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            enable: false,
            tool: DEFAULT_FIREWALL_TOOL.into(),
        }
    }
}

/// Everything a provisioning run needs.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub tunnel: TunnelSettings,
    pub fleet: FleetSettings,
    pub firewall: FirewallSettings,
}
