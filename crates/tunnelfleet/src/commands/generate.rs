//! Fleet provisioning: `tunnelfleet generate`.

use std::net::SocketAddr;

use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use tunnelfleet_config::{load, resolve_config_path};
use tunnelfleet_core::host::resolve_host_ip;
use tunnelfleet_core::render::{proxy_service_name, tunnel_service_name};
use tunnelfleet_core::select::join_ids;
use tunnelfleet_core::{
    AccessEntry, Catalog, CommandFirewall, Firewall, FleetConfig, ProvisionEnv, ProvisionReport,
    TcpProbe, provision,
};

use crate::cli::{GenerateArgs, GlobalOpts, OutputFormat};
use crate::commands::Outcome;
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

/// One provisioned instance as shown to the user. Credentials stay in the access list file.
#[derive(Debug, Serialize)]
struct InstanceView {
    index: usize,
    port: u16,
    tunnel: String,
    proxy: String,
    address: String,
    endpoints: String,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Tunnel")]
    tunnel: String,
    #[tabled(rename = "Proxy")]
    proxy: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Endpoints")]
    endpoints: String,
}

impl From<&InstanceView> for InstanceRow {
    fn from(v: &InstanceView) -> Self {
        Self {
            index: v.index,
            port: v.port,
            tunnel: v.tunnel.clone(),
            proxy: v.proxy.clone(),
            address: v.address.clone(),
            endpoints: v.endpoints.clone(),
        }
    }
}

fn views(report: &ProvisionReport) -> Vec<InstanceView> {
    report
        .instances
        .iter()
        .zip(&report.access)
        .map(|(instance, entry)| InstanceView {
            index: instance.index,
            port: instance.port,
            tunnel: tunnel_service_name(instance.index),
            proxy: proxy_service_name(instance.index),
            address: address(entry),
            endpoints: join_ids(&instance.endpoints),
        })
        .collect()
}

fn address(entry: &AccessEntry) -> String {
    SocketAddr::new(entry.host, entry.port).to_string()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &GenerateArgs, global: &GlobalOpts) -> Result<Outcome, CliError> {
    let path = resolve_config_path(global.config.as_deref());
    let mut config = load(&path)?.config;
    apply_overrides(&mut config, args);

    let catalog = Catalog::builtin()?;
    let firewall = CommandFirewall::new(config.firewall.tool.clone());
    let env = ProvisionEnv {
        probe: &TcpProbe,
        firewall: (!args.no_firewall).then_some(&firewall as &dyn Firewall),
        host_ip: resolve_host_ip(),
        allow_partial: args.allow_partial,
    };

    let report = provision(&config, &catalog, &env)?;
    info!(
        instances = report.instances.len(),
        dir = %report.output_dir.display(),
        "fleet generated"
    );

    let views = views(&report);
    let out = match global.output {
        // Plain output is the access list itself, ready to pipe.
        OutputFormat::Plain => report
            .access
            .iter()
            .map(AccessEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => output::render_list(
            &global.output,
            &views,
            |v| InstanceRow::from(v),
            |v| v.address.clone(),
        )?,
    };
    output::print_output(&out, global.quiet);

    if matches!(global.output, OutputFormat::Table) {
        output::print_output(&summary(&report), global.quiet);
    }
    output::print_warnings(&report.warnings, output::should_color(&global.color));

    Ok(Outcome::from_warnings(&report.warnings))
}

fn apply_overrides(config: &mut FleetConfig, args: &GenerateArgs) {
    if let Some(count) = args.count {
        config.fleet.count = usize::from(count);
    }
    if let Some(base_port) = args.base_port {
        config.fleet.base_port = base_port;
    }
    if let Some(dir) = &args.output_dir {
        config.fleet.output_dir.clone_from(dir);
    }
}

fn summary(report: &ProvisionReport) -> String {
    let firewall = if report.firewall_synced {
        "ports opened"
    } else {
        "not updated"
    };
    format!(
        "Descriptor:  {}\nAccess list: {}\nFirewall:    {firewall}",
        report.written.descriptor.display(),
        report.written.access_list.display(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv6Addr};

    use secrecy::SecretString;

    use super::*;

    fn entry(host: IpAddr) -> AccessEntry {
        AccessEntry {
            index: 1,
            username: "proxy".into(),
            password: SecretString::from("pw"),
            host,
            port: 9000,
        }
    }

    #[test]
    fn address_drops_credentials() {
        assert_eq!(
            address(&entry(IpAddr::from([192, 0, 2, 10]))),
            "192.0.2.10:9000"
        );
    }

    #[test]
    fn address_keeps_ipv6_brackets() {
        assert_eq!(
            address(&entry(IpAddr::V6(Ipv6Addr::LOCALHOST))),
            "[::1]:9000"
        );
    }
}
