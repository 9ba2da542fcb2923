//! Configuration for tunnelfleet.
//!
//! Locates the YAML config, validates the raw document, layers
//! `TUNNELFLEET_*` environment overrides on top with figment, and
//! translates the result into `tunnelfleet_core::FleetConfig`. The core
//! crate never reads the provisioning config itself.

mod validate;

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use tunnelfleet_core::config::{
    DEFAULT_FIREWALL_TOOL, DEFAULT_MAX_ENDPOINTS, DEFAULT_OUTPUT_DIR, DEFAULT_PROXY_IMAGE,
    DEFAULT_TUNNEL_IMAGE,
};
use tunnelfleet_core::merge::{RANDOM_KEY, endpoint_toggles};
use tunnelfleet_core::{
    Document, FirewallSettings, FleetConfig, FleetSettings, TunnelSettings, VpnProtocol,
};

pub use validate::validate;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Prefix of environment overrides, e.g. `TUNNELFLEET_FLEET__COUNT=4`.
pub const ENV_PREFIX: &str = "TUNNELFLEET_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key `{key}`")]
    Missing { key: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("config file not found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── File schema ─────────────────────────────────────────────────────

/// The YAML layout of `config.yaml`.
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub tunnel: TunnelSection,
    pub fleet: FleetSection,
    pub firewall: FirewallSection,
}

#[derive(Debug, Deserialize)]
pub struct TunnelSection {
    pub user: String,
    pub secret: SecretString,

    #[serde(default)]
    pub protocol: VpnProtocol,

    /// Endpoint toggles plus the `random` flag.
    #[serde(default)]
    pub endpoints: IndexMap<String, bool>,

    /// Makes random endpoint selection reproducible.
    pub seed: Option<u64>,

    #[serde(default = "default_tunnel_image")]
    pub image: String,

    /// LAN range that bypasses the tunnel.
    pub network: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FleetSection {
    pub count: usize,
    pub base_port: u16,
    pub username: String,
    pub password: SecretString,

    #[serde(default = "default_max_endpoints")]
    pub max_endpoints_per_instance: usize,

    #[serde(default = "default_proxy_image")]
    pub proxy_image: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_stagger")]
    pub stagger: bool,
}

#[derive(Debug, Deserialize)]
pub struct FirewallSection {
    #[serde(default)]
    pub enable: bool,

    #[serde(default = "default_firewall_tool")]
    pub tool: String,
}

fn default_tunnel_image() -> String {
    DEFAULT_TUNNEL_IMAGE.into()
}
fn default_proxy_image() -> String {
    DEFAULT_PROXY_IMAGE.into()
}
fn default_output_dir() -> PathBuf {
    DEFAULT_OUTPUT_DIR.into()
}
fn default_max_endpoints() -> usize {
    DEFAULT_MAX_ENDPOINTS
}
fn default_stagger() -> bool {
    true
}
fn default_firewall_tool() -> String {
    DEFAULT_FIREWALL_TOOL.into()
}

// ── Loading ─────────────────────────────────────────────────────────

/// A validated config together with the document it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub document: Document,
    pub config: FleetConfig,
}

/// The config path to use: an explicit path, else `config.yaml` in the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf)
}

/// Read the config file as a generic document. An empty file is an empty document.
pub fn load_document(path: &Path) -> Result<Document, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ConfigError::Io(e),
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Null => Ok(Document::new()),
        Value::Mapping(m) => Ok(m),
        _ => Err(invalid("<root>", "expected a mapping of sections")),
    }
}

/// Validate `document`, apply environment overrides, and build a `FleetConfig`.
pub fn extract(document: &Document) -> Result<FleetConfig, ConfigError> {
    validate(document)?;

    let file: FileConfig = Figment::from(Serialized::defaults(document))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;

    let mut config = file.into_fleet_config()?;

    // figment dictionaries are sorted; keep the order the file lists endpoints in.
    let order = endpoint_toggles(document);
    let position = |name: &String| order.get_index_of(name).unwrap_or(usize::MAX);
    config
        .tunnel
        .endpoints
        .sort_by(|a, _, b, _| position(a).cmp(&position(b)));

    Ok(config)
}

/// Load, validate, and translate the config at `path`.
pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let document = load_document(path)?;
    let config = extract(&document)?;
    debug!(path = %path.display(), count = config.fleet.count, "config loaded");
    Ok(LoadedConfig {
        path: path.to_path_buf(),
        document,
        config,
    })
}

// ── Translation ─────────────────────────────────────────────────────

impl FileConfig {
    /// Check value ranges and produce the core runtime config.
    pub fn into_fleet_config(self) -> Result<FleetConfig, ConfigError> {
        let FileConfig {
            tunnel,
            fleet,
            firewall,
        } = self;

        if fleet.count == 0 {
            return Err(invalid("fleet.count", "must be at least 1"));
        }
        if fleet.base_port == 0 {
            return Err(invalid("fleet.base_port", "must be between 1 and 65535"));
        }
        if fleet.max_endpoints_per_instance == 0 {
            return Err(invalid(
                "fleet.max_endpoints_per_instance",
                "must be at least 1",
            ));
        }
        check_credential("fleet.username", &fleet.username, &[':', '@'])?;
        check_credential("fleet.password", fleet.password.expose_secret(), &['@'])?;

        let mut endpoints = tunnel.endpoints;
        let random = endpoints.shift_remove(RANDOM_KEY).unwrap_or(false);

        Ok(FleetConfig {
            tunnel: TunnelSettings {
                user: tunnel.user,
                secret: tunnel.secret,
                protocol: tunnel.protocol,
                endpoints,
                random,
                seed: tunnel.seed,
                image: tunnel.image,
                network: tunnel.network,
            },
            fleet: FleetSettings {
                count: fleet.count,
                base_port: fleet.base_port,
                username: fleet.username,
                password: fleet.password,
                max_endpoints_per_instance: fleet.max_endpoints_per_instance,
                proxy_image: fleet.proxy_image,
                output_dir: fleet.output_dir,
                stagger: fleet.stagger,
            },
            firewall: FirewallSettings {
                enable: firewall.enable,
                tool: firewall.tool,
            },
        })
    }
}

/// Proxy credentials end up in `user:pass@host:port` lines and in a
/// whitespace-separated `BasicAuth` directive.
fn check_credential(field: &str, value: &str, forbidden: &[char]) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(invalid(field, "cannot be empty"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || forbidden.contains(c))
    {
        return Err(invalid(field, &format!("cannot contain {c:?}")));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}
