// ── Endpoint selection ──
//
// Picks the endpoint identifiers every tunnel unit of a run connects
// through. The choice is fleet-wide: computed once, then shared by all
// instances.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Catalog, EndpointId};
use crate::config::TunnelSettings;
use crate::error::CoreError;

/// Which rule produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Explicitly enabled endpoints, in catalog order.
    Enabled,
    /// `random` was requested.
    Random,
    /// Nothing usable was enabled, so the random rule stood in.
    RandomFallback,
}

/// The fleet-wide endpoint choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub ids: Vec<EndpointId>,
    pub policy: SelectionPolicy,
}

impl Selection {
    /// Identifiers joined the way the tunnel image expects (`81;74;108`).
    pub fn joined(&self) -> String {
        join_ids(&self.ids)
    }
}

pub fn join_ids(ids: &[EndpointId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// Choose at most `max_per_instance` endpoint identifiers from `catalog`.
///
/// 1. `random` set: draw without replacement.
/// 2. Otherwise every enabled catalog entry, in catalog order, up to the cap.
/// 3. Nothing enabled (or nothing recognized): fall back to 1.
pub fn select(
    catalog: &Catalog,
    tunnel: &TunnelSettings,
    max_per_instance: usize,
) -> Result<Selection, CoreError> {
    if catalog.is_empty() {
        return Err(CoreError::EndpointSelection {
            reason: "endpoint catalog is empty".into(),
        });
    }
    if max_per_instance == 0 {
        return Err(CoreError::EndpointSelection {
            reason: "max endpoints per instance must be at least 1".into(),
        });
    }

    if tunnel.random {
        let ids = random_ids(catalog, max_per_instance, tunnel.seed);
        debug!(count = ids.len(), "selected random endpoints");
        return Ok(Selection {
            ids,
            policy: SelectionPolicy::Random,
        });
    }

    let ids: Vec<_> = catalog
        .enabled_ids(&tunnel.endpoints)
        .take(max_per_instance)
        .collect();

    if ids.is_empty() {
        info!("no enabled endpoints recognized, falling back to random selection");
        return Ok(Selection {
            ids: random_ids(catalog, max_per_instance, tunnel.seed),
            policy: SelectionPolicy::RandomFallback,
        });
    }

    debug!(count = ids.len(), "selected enabled endpoints");
    Ok(Selection {
        ids,
        policy: SelectionPolicy::Enabled,
    })
}

fn random_ids(catalog: &Catalog, amount: usize, seed: Option<u64>) -> Vec<EndpointId> {
    let pool: Vec<EndpointId> = catalog.iter().map(|e| e.id).collect();
    match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            pool.choose_multiple(&mut rng, amount).copied().collect()
        }
        None => pool
            .choose_multiple(&mut rand::thread_rng(), amount)
            .copied()
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use indexmap::IndexMap;
    use secrecy::SecretString;

    use super::*;
    use crate::catalog::Endpoint;
    use crate::config::VpnProtocol;

    fn tunnel(toggles: &[(&str, bool)], random: bool) -> TunnelSettings {
        TunnelSettings {
            user: "user".into(),
            secret: SecretString::from("secret"),
            protocol: VpnProtocol::default(),
            endpoints: toggles
                .iter()
                .map(|(name, on)| ((*name).to_owned(), *on))
                .collect::<IndexMap<_, _>>(),
            random,
            seed: None,
            image: "tunnel".into(),
            network: None,
        }
    }

    fn small_catalog() -> Catalog {
        Catalog::new(
            "test",
            [("France", 74), ("Germany", 81), ("Japan", 108)].map(|(name, id)| Endpoint {
                name: name.into(),
                id: EndpointId(id),
                code: String::new(),
            }),
        )
    }

    #[test]
    fn enabled_endpoints_are_returned_without_fallback() {
        let catalog = Catalog::builtin().unwrap();
        let cfg = tunnel(&[("Germany", true), ("France", true)], false);

        let selection = select(&catalog, &cfg, 5).unwrap();
        assert_eq!(selection.policy, SelectionPolicy::Enabled);
        // Catalog order: France precedes Germany.
        assert_eq!(selection.ids, vec![EndpointId(74), EndpointId(81)]);
        assert_eq!(selection.joined(), "74;81");
    }

    #[test]
    fn enabled_selection_is_deterministic() {
        let catalog = Catalog::builtin().unwrap();
        let cfg = tunnel(&[("Japan", true), ("Kenya", true), ("Spain", true)], false);

        let first = select(&catalog, &cfg, 2).unwrap();
        for _ in 0..10 {
            assert_eq!(select(&catalog, &cfg, 2).unwrap(), first);
        }
        assert_eq!(first.ids.len(), 2);
    }

    #[test]
    fn cap_limits_enabled_selection() {
        let catalog = small_catalog();
        let cfg = tunnel(&[("France", true), ("Germany", true), ("Japan", true)], false);
        let selection = select(&catalog, &cfg, 1).unwrap();
        assert_eq!(selection.ids, vec![EndpointId(74)]);
    }

    #[test]
    fn unknown_or_disabled_names_fall_back_to_random() {
        let catalog = small_catalog();
        let cfg = tunnel(&[("Atlantis", true), ("France", false)], false);

        let selection = select(&catalog, &cfg, 2).unwrap();
        assert_eq!(selection.policy, SelectionPolicy::RandomFallback);
        assert_eq!(selection.ids.len(), 2);
    }

    #[test]
    fn random_draws_distinct_ids_from_catalog() {
        let catalog = Catalog::builtin().unwrap();
        let known: HashSet<_> = catalog.iter().map(|e| e.id).collect();
        let cfg = tunnel(&[("Germany", true)], true);

        for _ in 0..20 {
            let selection = select(&catalog, &cfg, 5).unwrap();
            assert_eq!(selection.policy, SelectionPolicy::Random);
            assert_eq!(selection.ids.len(), 5);
            let unique: HashSet<_> = selection.ids.iter().copied().collect();
            assert_eq!(unique.len(), 5);
            assert!(unique.is_subset(&known));
        }
    }

    #[test]
    fn random_never_exceeds_catalog_size() {
        let catalog = small_catalog();
        let cfg = tunnel(&[], true);
        let selection = select(&catalog, &cfg, 10).unwrap();
        assert_eq!(selection.ids.len(), 3);
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let catalog = Catalog::builtin().unwrap();
        let mut cfg = tunnel(&[], true);
        cfg.seed = Some(42);

        let a = select(&catalog, &cfg, 4).unwrap();
        let b = select(&catalog, &cfg, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let catalog = Catalog::new("empty", Vec::<Endpoint>::new());
        let err = select(&catalog, &tunnel(&[], true), 5).unwrap_err();
        assert!(matches!(err, CoreError::EndpointSelection { .. }));
    }

    #[test]
    fn zero_cap_is_an_error() {
        let err = select(&small_catalog(), &tunnel(&[("France", true)], false), 0).unwrap_err();
        assert!(matches!(err, CoreError::EndpointSelection { .. }));
    }
}
