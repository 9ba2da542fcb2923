//! Fleet provisioning and catalog maintenance for tunnel + proxy pairs.
//!
//! Two paths run through this crate:
//!
//! - **Provisioning** ([`provision()`]) to allocate free TCP ports
//!   ([`ports`]), choose endpoints once for the whole fleet ([`select()`]),
//!   render a compose descriptor, an access list and per-instance proxy
//!   configs ([`render()`]), then ask the host firewall to open the ports
//!   ([`firewall`]).
//!
//! - **Maintenance** ([`merge::sync_config_file`]) to reconcile a persisted
//!   config's endpoint toggles with the built-in [`Catalog`], backing the
//!   file up first, and optionally refresh the endpoint list of an
//!   already-rendered descriptor ([`patch`]).
//!
//! The crate never parses CLI flags or locates config files; it receives a
//! [`FleetConfig`] or a document path from its caller.

pub mod catalog;
pub mod config;
pub mod error;
pub mod firewall;
pub mod host;
pub mod merge;
pub mod patch;
pub mod persist;
pub mod ports;
pub mod provision;
pub mod render;
pub mod select;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{Catalog, Endpoint, EndpointId};
pub use config::{FirewallSettings, FleetConfig, FleetSettings, TunnelSettings, VpnProtocol};
pub use error::CoreError;
pub use firewall::{CommandFirewall, Firewall};
pub use merge::{Document, SyncReport};
pub use ports::{PortProbe, TcpProbe, allocate};
pub use provision::{ProvisionEnv, ProvisionReport, provision};
pub use render::{AccessEntry, Artifacts, ComposeFile, Instance, render};
pub use select::{Selection, SelectionPolicy, select};
