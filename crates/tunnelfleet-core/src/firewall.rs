// ── Host firewall synchronization ──
//
// Opens each allocated port for inbound TCP, then reloads the rules.
// The firewall is an external collaborator: failures here never abort a
// run, they only mean the ports are allocated but not yet reachable.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::CoreError;

/// A host firewall that can open TCP ports.
pub trait Firewall {
    fn allow_tcp(&self, port: u16) -> Result<(), CoreError>;
    fn reload(&self) -> Result<(), CoreError>;
}

/// Drives a ufw-compatible command-line tool (`<tool> allow <port>/tcp`, `<tool> reload`).
#[derive(Debug, Clone)]
pub struct CommandFirewall {
    tool: String,
}

impl CommandFirewall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn run(&self, args: &[&str]) -> Result<(), CoreError> {
        debug!(tool = %self.tool, ?args, "running firewall command");
        let output = Command::new(&self.tool)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CoreError::FirewallSync {
                message: format!("cannot run {}: {e}", self.tool),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(CoreError::FirewallSync {
            message: format!(
                "{} {} exited with {}: {}",
                self.tool,
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        })
    }
}

impl Firewall for CommandFirewall {
    fn allow_tcp(&self, port: u16) -> Result<(), CoreError> {
        self.run(&["allow", &format!("{port}/tcp")])
    }

    fn reload(&self) -> Result<(), CoreError> {
        self.run(&["reload"])
    }
}

/// Open every port in `ports`, then reload. Stops at the first failure.
pub fn sync_ports(firewall: &dyn Firewall, ports: &[u16]) -> Result<(), CoreError> {
    for &port in ports {
        firewall.allow_tcp(port)?;
    }
    firewall.reload()?;
    info!(ports = ports.len(), "firewall rules updated");
    Ok(())
}
