//! Clap derive structures for the `tunnelfleet` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tunnelfleet -- authenticated HTTP proxies behind VPN tunnels, one compose file
#[derive(Debug, Parser)]
#[command(
    name = "tunnelfleet",
    version,
    about = "Provision fleets of authenticated HTTP proxies behind VPN tunnels",
    long_about = "Generates a docker-compose descriptor pairing each VPN tunnel container\n\
        with an authenticated HTTP proxy, an access list of proxy URLs, and\n\
        per-instance proxy configs. Also keeps the endpoint list of an existing\n\
        config in step with the built-in endpoint catalog.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the YAML config [default: ./config.yaml]
    #[arg(long, short = 'c', env = "TUNNELFLEET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Allocate ports and write the compose file, access list and proxy configs
    #[command(alias = "gen", alias = "g")]
    Generate(GenerateArgs),

    /// Merge the built-in endpoint catalog into the config and refresh the compose file
    #[command(alias = "sync")]
    SyncCatalog(SyncArgs),

    /// List the built-in endpoint catalog
    #[command(alias = "ls")]
    Catalog,

    /// Check the config file without touching anything else
    Validate,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Number of proxy instances (overrides fleet.count)
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u16).range(1..))]
    pub count: Option<u16>,

    /// First port to probe (overrides fleet.base_port)
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u16).range(1..))]
    pub base_port: Option<u16>,

    /// Directory for generated files (overrides fleet.output_dir)
    #[arg(long, short = 'd')]
    pub output_dir: Option<PathBuf>,

    /// Skip opening ports in the host firewall
    #[arg(long)]
    pub no_firewall: bool,

    /// Provision fewer instances when the port range runs out
    #[arg(long)]
    pub allow_partial: bool,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Only update the config; leave an existing compose file alone
    #[arg(long)]
    pub no_patch: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
