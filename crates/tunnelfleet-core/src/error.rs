// ── Core error types ──
//
// One variant per failure class of a provisioning or maintenance run.
// Some variants are fatal (the run aborts), others only degrade a
// best-effort step and end up in a report's warning list instead.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Built-in endpoint catalog is malformed: {0}")]
    Catalog(#[source] serde_yaml::Error),

    // ── Provisioning errors ──────────────────────────────────────────
    #[error(
        "Only {available} of {requested} ports available starting at {base_port}",
        available = .found.len()
    )]
    PortExhaustion {
        requested: usize,
        base_port: u16,
        /// Ports that were available before the range ran out.
        found: Vec<u16>,
    },

    #[error("Endpoint selection failed: {reason}")]
    EndpointSelection { reason: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Cannot write {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    // ── Best-effort steps (reported as warnings) ─────────────────────
    #[error("Could not back up {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Field {field} not found in {}", .path.display())]
    PatchNotFound { path: PathBuf, field: String },

    #[error("Firewall sync failed: {message}")]
    FirewallSync { message: String },
}

impl CoreError {
    /// Whether this error aborts a run, as opposed to degrading a best-effort step.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Backup { .. } | Self::PatchNotFound { .. } | Self::FirewallSync { .. }
        )
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_effort_errors_are_not_fatal() {
        let fw = CoreError::FirewallSync {
            message: "ufw: command not found".into(),
        };
        let patch = CoreError::PatchNotFound {
            path: "docker-compose.yml".into(),
            field: "COUNTRY".into(),
        };
        assert!(!fw.is_fatal());
        assert!(!patch.is_fatal());
    }

    #[test]
    fn exhaustion_reports_found_count() {
        let err = CoreError::PortExhaustion {
            requested: 3,
            base_port: 65534,
            found: vec![65534, 65535],
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Only 2 of 3 ports available starting at 65534"
        );
    }
}
