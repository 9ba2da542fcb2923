// ── Provisioning run ──
//
// Ties the pieces together: allocate ports, pick endpoints once for the
// whole fleet, render, write, then open the firewall. Allocation and
// selection failures abort before anything is written; a firewall
// failure only adds a warning to the report.

use std::net::IpAddr;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::FleetConfig;
use crate::error::CoreError;
use crate::firewall::{Firewall, sync_ports};
use crate::ports::{PortProbe, allocate_with};
use crate::render::{AccessEntry, Instance, RenderContext, WrittenArtifacts, render};
use crate::select::{Selection, select};

/// Collaborators and knobs for one run.
pub struct ProvisionEnv<'a> {
    pub probe: &'a dyn PortProbe,
    /// `None` skips firewall sync even when the config enables it.
    pub firewall: Option<&'a dyn Firewall>,
    pub host_ip: IpAddr,
    /// Accept fewer instances than requested when the port range runs out.
    pub allow_partial: bool,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct ProvisionReport {
    pub output_dir: PathBuf,
    pub instances: Vec<Instance>,
    pub selection: Selection,
    pub access: Vec<AccessEntry>,
    pub written: WrittenArtifacts,
    /// Ports were allocated and the firewall was asked to open them.
    pub firewall_synced: bool,
    /// Non-fatal problems encountered along the way.
    pub warnings: Vec<CoreError>,
}

impl ProvisionReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Provision the fleet described by `config`.
pub fn provision(
    config: &FleetConfig,
    catalog: &Catalog,
    env: &ProvisionEnv<'_>,
) -> Result<ProvisionReport, CoreError> {
    let fleet = &config.fleet;
    let mut warnings = Vec::new();

    let ports = match allocate_with(env.probe, fleet.base_port, fleet.count) {
        Ok(ports) => ports,
        Err(CoreError::PortExhaustion {
            requested,
            base_port,
            found,
        }) if env.allow_partial && !found.is_empty() => {
            warn!(
                requested,
                available = found.len(),
                "port range exhausted, continuing with a partial fleet"
            );
            warnings.push(CoreError::PortExhaustion {
                requested,
                base_port,
                found: found.clone(),
            });
            found
        }
        Err(e) => return Err(e),
    };
    info!(?ports, "ports allocated");

    let selection = select(catalog, &config.tunnel, fleet.max_endpoints_per_instance)?;
    info!(
        endpoints = %selection.joined(),
        policy = ?selection.policy,
        "endpoints selected"
    );

    let instances: Vec<Instance> = ports
        .iter()
        .zip(1..)
        .map(|(&port, index)| Instance {
            index,
            port,
            endpoints: selection.ids.clone(),
        })
        .collect();

    let ctx = RenderContext {
        tunnel: &config.tunnel,
        fleet,
        host_ip: env.host_ip,
    };
    let artifacts = render(&ctx, &instances);
    let written = artifacts.write(&fleet.output_dir)?;

    let mut firewall_synced = false;
    if config.firewall.enable {
        match env.firewall {
            Some(fw) => match sync_ports(fw, &ports) {
                Ok(()) => firewall_synced = true,
                Err(e) => {
                    warn!(error = %e, "firewall sync skipped");
                    warnings.push(e);
                }
            },
            None => info!("firewall sync disabled for this run"),
        }
    }

    Ok(ProvisionReport {
        output_dir: fleet.output_dir.clone(),
        instances,
        selection,
        access: artifacts.access,
        written,
        firewall_synced,
        warnings,
    })
}
