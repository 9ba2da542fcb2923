//! Config check: `tunnelfleet validate`.

use std::path::PathBuf;

use serde::Serialize;

use tunnelfleet_config::{load, resolve_config_path};

use crate::cli::GlobalOpts;
use crate::commands::Outcome;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ValidationSummary {
    config: PathBuf,
    count: usize,
    base_port: u16,
    protocol: String,
    random: bool,
    enabled: Vec<String>,
    firewall: bool,
}

pub fn handle(global: &GlobalOpts) -> Result<Outcome, CliError> {
    let path = resolve_config_path(global.config.as_deref());
    let loaded = load(&path)?;
    let cfg = &loaded.config;

    let summary = ValidationSummary {
        config: loaded.path.clone(),
        count: cfg.fleet.count,
        base_port: cfg.fleet.base_port,
        protocol: cfg.tunnel.protocol.to_string(),
        random: cfg.tunnel.random,
        enabled: cfg
            .tunnel
            .endpoints
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.clone())
            .collect(),
        firewall: cfg.firewall.enable,
    };

    let out = output::render_single(&global.output, &summary, |s| {
        let endpoints = if s.random {
            "random".to_owned()
        } else if s.enabled.is_empty() {
            "none enabled (random fallback)".to_owned()
        } else {
            s.enabled.join(", ")
        };
        format!(
            "{} is valid\n  instances: {} from port {}\n  protocol:  {}\n  endpoints: {endpoints}\n  firewall:  {}",
            s.config.display(),
            s.count,
            s.base_port,
            s.protocol,
            if s.firewall { "enabled" } else { "disabled" },
        )
    })?;
    output::print_output(&out, global.quiet);
    Ok(Outcome::Clean)
}
