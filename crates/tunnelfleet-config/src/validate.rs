//! Presence and shape checks on the raw configuration document.
//!
//! Runs before anything stateful (port probing, file writes) so a broken
//! config fails fast with the first offending key.

use tunnelfleet_core::Document;
use tunnelfleet_core::merge::{ENDPOINTS_KEY, FIREWALL_SECTION, FLEET_SECTION, TUNNEL_SECTION};

use crate::ConfigError;

const REQUIRED_SECTIONS: [&str; 3] = [TUNNEL_SECTION, FLEET_SECTION, FIREWALL_SECTION];
const TUNNEL_CREDENTIALS: [&str; 2] = ["user", "secret"];

/// Check that every required section and tunnel key is present and well-typed.
///
/// Order of checks: `tunnel`, `fleet`, `firewall`, then `tunnel.user`,
/// `tunnel.secret`, `tunnel.endpoints`. Endpoint names are not checked
/// against the catalog; unknown names are ignored later.
pub fn validate(doc: &Document) -> Result<(), ConfigError> {
    for section in REQUIRED_SECTIONS {
        let value = doc.get(section).ok_or_else(|| missing(section))?;
        if !value.is_mapping() {
            return Err(ConfigError::Invalid {
                field: section.into(),
                reason: "expected a mapping".into(),
            });
        }
    }

    let tunnel = &doc[TUNNEL_SECTION];
    for key in TUNNEL_CREDENTIALS {
        let value = tunnel
            .get(key)
            .ok_or_else(|| missing(&format!("{TUNNEL_SECTION}.{key}")))?;
        if !value.is_string() {
            return Err(ConfigError::Invalid {
                field: format!("{TUNNEL_SECTION}.{key}"),
                reason: "expected a string (quote numeric values)".into(),
            });
        }
    }

    let endpoints = tunnel
        .get(ENDPOINTS_KEY)
        .ok_or_else(|| missing(&format!("{TUNNEL_SECTION}.{ENDPOINTS_KEY}")))?;
    let Some(endpoints) = endpoints.as_mapping() else {
        return Err(ConfigError::Invalid {
            field: format!("{TUNNEL_SECTION}.{ENDPOINTS_KEY}"),
            reason: "expected a mapping of endpoint name to true/false".into(),
        });
    };
    for (name, enabled) in endpoints {
        if !enabled.is_bool() {
            let name = name.as_str().map_or_else(|| format!("{name:?}"), str::to_owned);
            return Err(ConfigError::Invalid {
                field: format!("{TUNNEL_SECTION}.{ENDPOINTS_KEY}.{name}"),
                reason: "expected true or false".into(),
            });
        }
    }

    Ok(())
}

fn missing(key: &str) -> ConfigError {
    ConfigError::Missing { key: key.into() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VALID: &str = "\
tunnel:
  user: alice
  secret: s3cret
  endpoints:
    random: false
    Germany: true
fleet:
  count: 2
  base_port: 9000
  username: proxy
  password: pw
firewall:
  enable: false
";

    fn doc(yaml: &str) -> Document {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn missing_key(yaml: &str) -> String {
        match validate(&doc(yaml)).unwrap_err() {
            ConfigError::Missing { key } => key,
            other => panic!("expected Missing, got {other}"),
        }
    }

    #[test]
    fn complete_document_passes() {
        validate(&doc(VALID)).unwrap();
    }

    #[test]
    fn sections_are_checked_in_order() {
        assert_eq!(missing_key("other: 1\n"), "tunnel");
        assert_eq!(missing_key("tunnel: {}\nfirewall: {}\n"), "fleet");
        assert_eq!(missing_key("tunnel: {}\nfleet: {}\n"), "firewall");
    }

    #[test]
    fn tunnel_keys_are_checked_in_order() {
        let base = "fleet: {}\nfirewall: {}\n";
        assert_eq!(missing_key(&format!("{base}tunnel: {{}}\n")), "tunnel.user");
        assert_eq!(
            missing_key(&format!("{base}tunnel:\n  user: a\n")),
            "tunnel.secret"
        );
        assert_eq!(
            missing_key(&format!("{base}tunnel:\n  user: a\n  secret: b\n")),
            "tunnel.endpoints"
        );
    }

    #[test]
    fn numeric_secret_is_rejected() {
        let yaml = VALID.replace("secret: s3cret", "secret: 1234");
        let err = validate(&doc(&yaml)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "tunnel.secret"));
    }

    #[test]
    fn null_section_is_rejected() {
        let yaml = VALID.replace("firewall:\n  enable: false\n", "firewall:\n");
        let err = validate(&doc(&yaml)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "firewall"));
    }

    #[test]
    fn non_boolean_toggle_is_rejected() {
        let yaml = VALID.replace("Germany: true", "Germany: maybe");
        let err = validate(&doc(&yaml)).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref field, .. } if field == "tunnel.endpoints.Germany")
        );
    }

    #[test]
    fn unknown_endpoint_names_are_accepted() {
        let yaml = VALID.replace("Germany: true", "Atlantis: true");
        validate(&doc(&yaml)).unwrap();
    }
}
