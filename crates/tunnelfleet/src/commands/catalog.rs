//! Built-in endpoint catalog listing.

use tabled::Tabled;
use tunnelfleet_core::{Catalog, Endpoint};

use crate::cli::GlobalOpts;
use crate::commands::Outcome;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Code")]
    code: String,
}

impl From<&Endpoint> for EndpointRow {
    fn from(e: &Endpoint) -> Self {
        Self {
            name: e.name.clone(),
            id: e.id.0,
            code: e.code.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(global: &GlobalOpts) -> Result<Outcome, CliError> {
    let catalog = Catalog::builtin()?;
    let endpoints: Vec<Endpoint> = catalog.iter().cloned().collect();
    let out = output::render_list(
        &global.output,
        &endpoints,
        |e| EndpointRow::from(e),
        |e| e.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(Outcome::Clean)
}
