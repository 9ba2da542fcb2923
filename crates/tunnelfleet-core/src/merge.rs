// ── Catalog merging ──
//
// Reconciles the persisted config's endpoint toggles with the built-in
// catalog. The catalog decides which names exist; the user's file decides
// which of them are on. Everything outside `tunnel.endpoints` is carried
// through untouched.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::CoreError;
use crate::persist::write_atomic;

/// A configuration file as a generic YAML mapping.
pub type Document = Mapping;

pub const TUNNEL_SECTION: &str = "tunnel";
pub const FLEET_SECTION: &str = "fleet";
pub const FIREWALL_SECTION: &str = "firewall";
pub const ENDPOINTS_KEY: &str = "endpoints";
pub const RANDOM_KEY: &str = "random";

const BACKUP_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// Backups taken within one timestamp before giving up.
const MAX_BACKUP_SLOTS: usize = 100;

/// Skeleton used when no persisted configuration exists yet.
pub fn empty_document() -> Document {
    let mut tunnel = Mapping::new();
    tunnel.insert(ENDPOINTS_KEY.into(), Value::Mapping(Mapping::new()));

    let mut doc = Mapping::new();
    doc.insert(TUNNEL_SECTION.into(), Value::Mapping(tunnel));
    doc.insert(FLEET_SECTION.into(), Value::Mapping(Mapping::new()));
    doc.insert(FIREWALL_SECTION.into(), Value::Mapping(Mapping::new()));
    doc
}

/// Rebuild `tunnel.endpoints` of `persisted` against `catalog`.
///
/// `random` is carried over (default `false`); every catalog name keeps its
/// previous toggle or starts disabled; names the catalog no longer lists
/// are dropped. Merging the output again yields the same document.
pub fn merge(catalog: &Catalog, persisted: Option<Document>) -> Document {
    let mut doc = persisted.unwrap_or_else(empty_document);
    let previous = endpoints_mapping(&doc).cloned().unwrap_or_default();

    let mut endpoints = Mapping::new();
    endpoints.insert(RANDOM_KEY.into(), Value::Bool(flag(&previous, RANDOM_KEY)));
    for name in catalog.names() {
        endpoints.insert(name.into(), Value::Bool(flag(&previous, name)));
    }

    tunnel_section_mut(&mut doc).insert(ENDPOINTS_KEY.into(), Value::Mapping(endpoints));
    doc
}

/// Endpoint toggles of a document, excluding the `random` flag.
pub fn endpoint_toggles(doc: &Document) -> IndexMap<String, bool> {
    let Some(endpoints) = endpoints_mapping(doc) else {
        return IndexMap::new();
    };
    endpoints
        .iter()
        .filter_map(|(k, v)| Some((k.as_str()?, v.as_bool()?)))
        .filter(|(name, _)| *name != RANDOM_KEY)
        .map(|(name, on)| (name.to_owned(), on))
        .collect()
}

/// Where the backup of `path` taken at `now` lives.
pub fn backup_path(path: &Path, now: NaiveDateTime) -> PathBuf {
    let mut name = path.file_name().unwrap_or(path.as_os_str()).to_os_string();
    name.push(format!(".backup_{}", now.format(BACKUP_TIMESTAMP)));
    path.with_file_name(name)
}

/// Backup name for `slot`: the plain timestamped name, then `_1`, `_2`, ...
fn backup_candidate(path: &Path, now: NaiveDateTime, slot: usize) -> PathBuf {
    let base = backup_path(path, now);
    if slot == 0 {
        return base;
    }
    let mut name = base.into_os_string();
    name.push(format!("_{slot}"));
    PathBuf::from(name)
}

/// Copy `path` to the first free backup name. Existing backups are never overwritten.
fn create_backup(path: &Path, now: NaiveDateTime) -> io::Result<PathBuf> {
    for slot in 0..MAX_BACKUP_SLOTS {
        let target = backup_candidate(path, now, slot);
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(mut file) => {
                let copied = File::open(path)
                    .and_then(|mut source| io::copy(&mut source, &mut file))
                    .and_then(|_| file.sync_all());
                if let Err(e) = copied {
                    let _ = std::fs::remove_file(&target);
                    return Err(e);
                }
                return Ok(target);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(backup = %target.display(), "backup name taken");
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{MAX_BACKUP_SLOTS} backups already exist for this timestamp"),
    ))
}

fn endpoints_mapping(doc: &Document) -> Option<&Mapping> {
    doc.get(TUNNEL_SECTION)?.get(ENDPOINTS_KEY)?.as_mapping()
}

fn tunnel_section_mut(doc: &mut Document) -> &mut Mapping {
    let slot = doc
        .entry(TUNNEL_SECTION.into())
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !slot.is_mapping() {
        *slot = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(section) = slot else {
        unreachable!("tunnel section was just made a mapping")
    };
    section
}

fn flag(map: &Mapping, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

// ── File synchronization ────────────────────────────────────────────

/// Result of reconciling a config file on disk.
#[derive(Debug)]
pub struct SyncReport {
    pub path: PathBuf,
    pub document: Document,
    /// No file existed; a skeleton was written.
    pub created: bool,
    pub backup: Option<PathBuf>,
    /// Catalog names that were not in the previous file.
    pub added: Vec<String>,
    /// Names the previous file had that the catalog no longer lists.
    pub dropped: Vec<String>,
    /// Non-fatal problems (a failed backup).
    pub warnings: Vec<CoreError>,
}

/// Merge `catalog` into the config file at `path`, backing it up first.
///
/// A failed backup is recorded as a warning and the merge proceeds.
/// Callers must not run two syncs against the same file concurrently.
pub fn sync_config_file(
    path: &Path,
    catalog: &Catalog,
    now: NaiveDateTime,
) -> Result<SyncReport, CoreError> {
    let mut warnings = Vec::new();
    let mut backup = None;

    let persisted = if path.exists() {
        match create_backup(path, now) {
            Ok(target) => {
                info!(backup = %target.display(), "config backed up");
                backup = Some(target);
            }
            Err(source) => {
                warn!(error = %source, "could not back up config, continuing");
                warnings.push(CoreError::Backup {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Some(read_document(path)?)
    } else {
        info!(path = %path.display(), "no existing config, creating one");
        None
    };

    let created = persisted.is_none();
    let before = persisted
        .as_ref()
        .map(endpoint_toggles)
        .unwrap_or_default();

    let document = merge(catalog, persisted);

    let added = catalog
        .names()
        .filter(|name| !before.contains_key(*name))
        .map(str::to_owned)
        .collect();
    let dropped = before
        .keys()
        .filter(|name| !catalog.contains(name))
        .cloned()
        .collect();

    let yaml = serde_yaml::to_string(&document).map_err(|source| CoreError::Serialization {
        what: "configuration",
        source,
    })?;
    write_atomic(path, &yaml)?;
    info!(path = %path.display(), catalog = catalog.version(), "config synchronized");

    Ok(SyncReport {
        path: path.to_path_buf(),
        document,
        created,
        backup,
        added,
        dropped,
        warnings,
    })
}

/// Read a config file as a generic document. An empty file is an empty document.
pub fn read_document(path: &Path) -> Result<Document, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|e| CoreError::Config {
        message: format!("{} is not valid YAML: {e}", path.display()),
    })?;
    match value {
        Value::Null => Ok(Document::new()),
        Value::Mapping(m) => Ok(m),
        _ => Err(CoreError::Config {
            message: format!("{} must contain a mapping at the top level", path.display()),
        }),
    }
}
