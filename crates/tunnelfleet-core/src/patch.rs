// ── In-place descriptor patching ──
//
// After a catalog sync, the endpoint list of an already-rendered
// descriptor can be refreshed without regenerating the whole fleet
// (and without re-allocating ports). The descriptor is parsed as YAML,
// only the endpoint variable of each service's environment is rewritten,
// and the result is written back whole.

use std::path::Path;

use serde_yaml::Value;
use tracing::info;

use crate::catalog::EndpointId;
use crate::error::CoreError;
use crate::persist::write_atomic;
use crate::render::ENDPOINT_VAR;
use crate::select::join_ids;

/// Rewrite the endpoint variable in every service of `descriptor`.
///
/// Handles both list-form (`- COUNTRY=81;74`) and map-form
/// (`COUNTRY: "81;74"`) environments. Returns the number of services
/// changed.
pub fn patch_value(descriptor: &mut Value, ids: &[EndpointId]) -> usize {
    let joined = join_ids(ids);
    let Some(services) = descriptor
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
    else {
        return 0;
    };

    let mut patched = 0;
    for service in services.values_mut() {
        let Some(env) = service.get_mut("environment") else {
            continue;
        };
        if patch_environment(env, &joined) {
            patched += 1;
        }
    }
    patched
}

fn patch_environment(env: &mut Value, joined: &str) -> bool {
    let prefix = format!("{ENDPOINT_VAR}=");
    match env {
        Value::Sequence(items) => {
            let mut hit = false;
            for item in items.iter_mut() {
                if item.as_str().is_some_and(|s| s.starts_with(&prefix)) {
                    *item = Value::String(format!("{prefix}{joined}"));
                    hit = true;
                }
            }
            hit
        }
        Value::Mapping(vars) => match vars.get_mut(ENDPOINT_VAR) {
            Some(slot) => {
                *slot = Value::String(joined.to_owned());
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Patch the descriptor file at `path` in place.
///
/// Fails with [`CoreError::PatchNotFound`] when no service carries the
/// endpoint variable; the file is left untouched in that case.
pub fn patch_descriptor(path: &Path, ids: &[EndpointId]) -> Result<usize, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::persistence(path, e))?;
    let mut descriptor: Value = serde_yaml::from_str(&text).map_err(|e| CoreError::Config {
        message: format!("{} is not valid YAML: {e}", path.display()),
    })?;

    let patched = patch_value(&mut descriptor, ids);
    if patched == 0 {
        return Err(CoreError::PatchNotFound {
            path: path.to_path_buf(),
            field: ENDPOINT_VAR.into(),
        });
    }

    let yaml = serde_yaml::to_string(&descriptor).map_err(|source| CoreError::Serialization {
        what: "descriptor",
        source,
    })?;
    write_atomic(path, &yaml)?;
    info!(path = %path.display(), services = patched, "descriptor endpoints patched");
    Ok(patched)
}
