// ── Endpoint catalog ──
//
// The set of tunnel endpoints (countries) the provider exposes. Ships as
// an embedded YAML asset, parsed once at start-up and handed to whoever
// needs it. Nothing mutates a `Catalog` after construction.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.yaml");

/// Numeric endpoint identifier understood by the tunnel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named egress point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub id: EndpointId,
    /// ISO 3166 alpha-2 code.
    pub code: String,
}

#[derive(Deserialize)]
struct CatalogAsset {
    version: String,
    endpoints: Vec<Endpoint>,
}

/// Immutable, ordered endpoint catalog keyed by display name.
#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,
    entries: IndexMap<String, Endpoint>,
}

impl Catalog {
    /// Parse the catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CoreError> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    /// Parse a catalog asset (`version` + `endpoints` list).
    pub fn from_yaml(source: &str) -> Result<Self, CoreError> {
        let asset: CatalogAsset = serde_yaml::from_str(source).map_err(CoreError::Catalog)?;
        Ok(Self::new(asset.version, asset.endpoints))
    }

    /// Build a catalog from endpoints. Later duplicates of a name replace earlier ones.
    pub fn new(version: impl Into<String>, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let entries = endpoints
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        Self {
            version: version.into(),
            entries,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Endpoints in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers of every catalog entry toggled on in `toggles`, in catalog order.
    ///
    /// Names unknown to the catalog are ignored.
    pub fn enabled_ids<'a>(
        &'a self,
        toggles: &'a IndexMap<String, bool>,
    ) -> impl Iterator<Item = EndpointId> + 'a {
        self.iter()
            .filter(|e| toggles.get(&e.name).copied().unwrap_or(false))
            .map(|e| e.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        assert!(!catalog.version().is_empty());
        assert_eq!(catalog.get("Germany").unwrap().id, EndpointId(81));
        assert_eq!(catalog.get("Norway").unwrap().code, "NO");
    }

    #[test]
    fn builtin_catalog_ids_are_unique() {
        let catalog = Catalog::builtin().unwrap();
        let mut ids: Vec<_> = catalog.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn enabled_ids_follow_catalog_order_and_skip_unknown() {
        let catalog = Catalog::builtin().unwrap();
        let toggles: IndexMap<String, bool> = [
            ("Japan".to_owned(), true),
            ("Atlantis".to_owned(), true),
            ("Albania".to_owned(), true),
            ("France".to_owned(), false),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = catalog.enabled_ids(&toggles).collect();
        assert_eq!(ids, vec![EndpointId(2), EndpointId(108)]);
    }

    #[test]
    fn malformed_asset_is_rejected() {
        let err = Catalog::from_yaml("version: 1\nendpoints: nope").unwrap_err();
        assert!(matches!(err, CoreError::Catalog(_)));
    }
}
