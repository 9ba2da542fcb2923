//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use tunnelfleet_config::ConfigError;
use tunnelfleet_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const PORTS: i32 = 3;
    pub const ENDPOINTS: i32 = 4;
    pub const PERSISTENCE: i32 = 5;
    /// The run completed but a best-effort step (backup, patch, firewall) did not.
    pub const WARNINGS: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found at {path}")]
    #[diagnostic(
        code(tunnelfleet::no_config),
        help(
            "Create one with: tunnelfleet sync-catalog --config {path}\n\
             then fill in the tunnel and fleet sections."
        )
    )]
    NoConfig { path: String },

    #[error("Missing required config key `{key}`")]
    #[diagnostic(
        code(tunnelfleet::missing_key),
        help("Required sections: tunnel (user, secret, endpoints), fleet, firewall.")
    )]
    MissingKey { key: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tunnelfleet::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(tunnelfleet::config))]
    Config(ConfigError),

    // ── Provisioning ─────────────────────────────────────────────────
    #[error("Only {available} of {requested} ports available starting at {base_port}")]
    #[diagnostic(
        code(tunnelfleet::ports_exhausted),
        help(
            "Lower --count, pick a different --base-port, or pass --allow-partial\n\
             to provision the instances that fit."
        )
    )]
    PortsExhausted {
        requested: usize,
        available: usize,
        base_port: u16,
    },

    #[error("Endpoint selection failed: {reason}")]
    #[diagnostic(
        code(tunnelfleet::endpoints),
        help("Run: tunnelfleet sync-catalog to refresh the endpoint list in your config")
    )]
    Endpoints { reason: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(tunnelfleet::persistence),
        help("Check that the output directory exists and is writable.")
    )]
    Persistence(CoreError),

    // ── Everything else ──────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(tunnelfleet::core))]
    Core(CoreError),

    #[error("Cannot render output: {0}")]
    #[diagnostic(code(tunnelfleet::output))]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. }
            | Self::MissingKey { .. }
            | Self::Validation { .. }
            | Self::Config(_) => exit_code::USAGE,
            Self::PortsExhausted { .. } => exit_code::PORTS,
            Self::Endpoints { .. } => exit_code::ENDPOINTS,
            Self::Persistence(_) => exit_code::PERSISTENCE,
            Self::Core(_) | Self::Output(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Missing { key } => Self::MissingKey { key },
            ConfigError::Invalid { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::PortExhaustion {
                requested,
                base_port,
                found,
            } => Self::PortsExhausted {
                requested,
                available: found.len(),
                base_port,
            },
            CoreError::EndpointSelection { reason } => Self::Endpoints { reason },
            err @ (CoreError::Persistence { .. } | CoreError::Serialization { .. }) => {
                Self::Persistence(err)
            }
            other => Self::Core(other),
        }
    }
}
