//! Catalog maintenance: `tunnelfleet sync-catalog`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, info, warn};

use tunnelfleet_config::resolve_config_path;
use tunnelfleet_core::config::{DEFAULT_MAX_ENDPOINTS, DEFAULT_OUTPUT_DIR};
use tunnelfleet_core::merge::{FLEET_SECTION, endpoint_toggles, sync_config_file};
use tunnelfleet_core::patch::patch_descriptor;
use tunnelfleet_core::render::DESCRIPTOR_FILE;
use tunnelfleet_core::{Catalog, CoreError, Document, EndpointId};

use crate::cli::{GlobalOpts, SyncArgs};
use crate::commands::Outcome;
use crate::error::CliError;
use crate::output;

/// What a sync changed, as shown to the user.
#[derive(Debug, Serialize)]
struct SyncSummary {
    config: PathBuf,
    catalog_version: String,
    created: bool,
    backup: Option<PathBuf>,
    added: Vec<String>,
    dropped: Vec<String>,
    /// Services whose endpoint list was rewritten, if a descriptor was patched.
    patched_services: Option<usize>,
}

pub fn handle(args: &SyncArgs, global: &GlobalOpts) -> Result<Outcome, CliError> {
    let path = resolve_config_path(global.config.as_deref());
    let catalog = Catalog::builtin()?;

    let report = sync_config_file(&path, &catalog, chrono::Local::now().naive_local())?;
    let mut warnings: Vec<String> = report.warnings.iter().map(ToString::to_string).collect();

    let mut patched_services = None;
    if args.no_patch {
        debug!("descriptor patch disabled");
    } else {
        match refresh_descriptor(&report.document, &catalog) {
            Ok(Patch::Applied(n)) => patched_services = Some(n),
            Ok(Patch::Skipped) => {}
            Ok(Patch::NothingEnabled(descriptor)) => warnings.push(format!(
                "no endpoints enabled in {}; {} left unchanged",
                path.display(),
                descriptor.display()
            )),
            // The config is already merged on disk; the descriptor refresh is best-effort.
            Err(e) => {
                warn!(error = %e, "descriptor not refreshed");
                warnings.push(if e.is_fatal() {
                    format!("descriptor not refreshed: {e}")
                } else {
                    e.to_string()
                });
            }
        }
    }

    let summary = SyncSummary {
        config: report.path,
        catalog_version: catalog.version().to_owned(),
        created: report.created,
        backup: report.backup,
        added: report.added,
        dropped: report.dropped,
        patched_services,
    };
    let out = output::render_single(&global.output, &summary, describe)?;
    output::print_output(&out, global.quiet);
    output::print_warnings(&warnings, output::should_color(&global.color));

    Ok(Outcome::from_warnings(&warnings))
}

fn describe(s: &SyncSummary) -> String {
    let mut lines = vec![format!(
        "{} {} (catalog {})",
        if s.created { "Created" } else { "Updated" },
        s.config.display(),
        s.catalog_version
    )];
    if let Some(backup) = &s.backup {
        lines.push(format!("Backup:  {}", backup.display()));
    }
    if !s.added.is_empty() {
        lines.push(format!("Added:   {}", s.added.join(", ")));
    }
    if !s.dropped.is_empty() {
        lines.push(format!("Dropped: {}", s.dropped.join(", ")));
    }
    if let Some(n) = s.patched_services {
        lines.push(format!("Patched: {n} tunnel service(s)"));
    }
    lines.join("\n")
}

// ── Descriptor refresh ──────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Patch {
    Applied(usize),
    /// No descriptor has been generated yet.
    Skipped,
    NothingEnabled(PathBuf),
}

/// Rewrite the endpoint list of an already-generated descriptor to match
/// the endpoints enabled in `document`, capped per instance.
fn refresh_descriptor(document: &Document, catalog: &Catalog) -> Result<Patch, CoreError> {
    let fleet = document.get(FLEET_SECTION);
    let output_dir = fleet
        .and_then(|f| f.get("output_dir"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_OUTPUT_DIR);
    let max = fleet
        .and_then(|f| f.get("max_endpoints_per_instance"))
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_MAX_ENDPOINTS);

    let descriptor = Path::new(output_dir).join(DESCRIPTOR_FILE);
    if !descriptor.is_file() {
        debug!(path = %descriptor.display(), "no descriptor to patch");
        return Ok(Patch::Skipped);
    }

    let toggles = endpoint_toggles(document);
    let ids: Vec<EndpointId> = catalog.enabled_ids(&toggles).take(max).collect();
    if ids.is_empty() {
        return Ok(Patch::NothingEnabled(descriptor));
    }

    let patched = patch_descriptor(&descriptor, &ids)?;
    info!(path = %descriptor.display(), services = patched, "descriptor refreshed");
    Ok(Patch::Applied(patched))
}
