//! File-based keychain settings.
//!
//! Settings are read from TOML, optionally overridden from the environment,
//! and turned into a [`Configuration`]:
//!
//! ```toml
//! family = "network"
//! server = "example.com"
//! protocol = "https"
//! port = 8443
//! access_group = "TEAMID.shared"
//! accessibility = "when_unlocked"
//! synchronization = "local_only"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Configuration, Family};
use crate::error::{KeychainError, Result};
use crate::policy::{Accessibility, InternetAuthenticationType, InternetProtocol, SynchronizationMode};

/// Environment variable overriding [`KeychainSettings::service`].
pub const ENV_SERVICE: &str = "KEYCHAINER_SERVICE";
/// Environment variable overriding [`KeychainSettings::server`].
pub const ENV_SERVER: &str = "KEYCHAINER_SERVER";
/// Environment variable overriding [`KeychainSettings::access_group`].
pub const ENV_ACCESS_GROUP: &str = "KEYCHAINER_ACCESS_GROUP";

/// Serializable description of a [`Configuration`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeychainSettings {
    pub family: Family,
    pub service: Option<String>,
    pub server: Option<String>,
    pub protocol: Option<InternetProtocol>,
    pub authentication_type: Option<InternetAuthenticationType>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub access_group: Option<String>,
    pub accessibility: Option<Accessibility>,
    pub synchronization: Option<SynchronizationMode>,
    pub label: Option<String>,
    pub comment: Option<String>,
    pub skip_authentication_ui: Option<bool>,
}

impl KeychainSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KeychainError::Settings {
            reason: format!("failed to parse TOML settings: {e}"),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        info!(path = %path.display(), family = %settings.family, "keychain settings loaded");
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KeychainError::Settings {
            reason: format!("failed to serialize settings as TOML: {e}"),
        })
    }

    /// Apply `KEYCHAINER_*` environment overrides. Empty variables are
    /// ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(service) = lookup(ENV_SERVICE) {
            debug!(variable = ENV_SERVICE, "overriding service from environment");
            self.service = Some(service);
        }
        if let Some(server) = lookup(ENV_SERVER) {
            debug!(variable = ENV_SERVER, "overriding server from environment");
            self.server = Some(server);
        }
        if let Some(group) = lookup(ENV_ACCESS_GROUP) {
            debug!(variable = ENV_ACCESS_GROUP, "overriding access group from environment");
            self.access_group = Some(group);
        }
    }

    /// Build the [`Configuration`] these settings describe.
    ///
    /// Fields belonging to the other family are rejected rather than
    /// silently dropped.
    pub fn into_configuration(self) -> Result<Configuration> {
        let mut config = match self.family {
            Family::Generic => {
                let network_only = [
                    ("server", self.server.is_some()),
                    ("protocol", self.protocol.is_some()),
                    ("authentication_type", self.authentication_type.is_some()),
                    ("port", self.port.is_some()),
                    ("path", self.path.is_some()),
                ];
                if let Some((field, _)) = network_only.iter().find(|(_, set)| *set) {
                    return Err(KeychainError::Settings {
                        reason: format!("generic settings cannot set `{field}`"),
                    });
                }
                let service = self.service.ok_or_else(|| KeychainError::Settings {
                    reason: "generic settings require `service`".into(),
                })?;
                Configuration::generic(service)?
            }
            Family::Network => {
                if self.service.is_some() {
                    return Err(KeychainError::Settings {
                        reason: "network settings cannot set `service`".into(),
                    });
                }
                let server = self.server.ok_or_else(|| KeychainError::Settings {
                    reason: "network settings require `server`".into(),
                })?;
                let mut config = Configuration::network(server.as_str())?.with_server(
                    server,
                    self.protocol,
                    self.authentication_type,
                )?;
                if let Some(port) = self.port {
                    config = config.with_port(port)?;
                }
                if let Some(path) = self.path {
                    config = config.with_path(path)?;
                }
                config
            }
        };

        if let Some(group) = self.access_group {
            config = config.with_access_group(group);
        }
        if let Some(accessibility) = self.accessibility {
            config = config.with_accessibility(accessibility);
        }
        if let Some(mode) = self.synchronization {
            config = config.with_synchronization_mode(mode);
        }
        if let Some(label) = self.label {
            config = config.with_label(label);
        }
        if let Some(comment) = self.comment {
            config = config.with_comment(comment);
        }
        if let Some(skip) = self.skip_authentication_ui {
            config = config.with_skip_authentication_ui(skip);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scope;
    use std::collections::HashMap;
    use std::io::Write;

    const NETWORK: &str = r#"
family = "network"
server = "example.com"
protocol = "https"
port = 8443
path = "/api"
access_group = "TEAM.shared"
accessibility = "when_unlocked"
synchronization = "local_only"
label = "API token"
"#;

    #[test]
    fn parses_network_settings() {
        let settings = KeychainSettings::from_toml_str(NETWORK).unwrap();
        assert_eq!(settings.family, Family::Network);
        assert_eq!(settings.protocol, Some(InternetProtocol::Https));
        assert_eq!(settings.port, Some(8443));

        let config = settings.into_configuration().unwrap();
        let Scope::Network(scope) = config.scope() else {
            panic!("expected a network scope");
        };
        assert_eq!(scope.server, "example.com");
        assert_eq!(scope.port, Some(8443));
        assert_eq!(scope.path.as_deref(), Some("/api"));
        assert_eq!(config.access_group(), Some("TEAM.shared"));
        assert_eq!(config.accessibility(), Accessibility::WhenUnlocked);
        assert_eq!(
            config.synchronization_mode(),
            Some(SynchronizationMode::LocalOnly)
        );
        assert_eq!(config.label(), Some("API token"));
    }

    #[test]
    fn generic_is_the_default_family() {
        let settings = KeychainSettings::from_toml_str(r#"service = "mail""#).unwrap();
        let config = settings.into_configuration().unwrap();
        assert_eq!(config.family(), Family::Generic);
        assert_eq!(config.accessibility(), Accessibility::AfterFirstUnlock);
    }

    #[test]
    fn missing_identifier_is_rejected() {
        let settings = KeychainSettings::from_toml_str(r#"family = "network""#).unwrap();
        assert!(matches!(
            settings.into_configuration(),
            Err(KeychainError::Settings { .. })
        ));
    }

    #[test]
    fn cross_family_fields_are_rejected() {
        let settings =
            KeychainSettings::from_toml_str("service = \"mail\"\nport = 25").unwrap();
        assert!(settings.into_configuration().is_err());
    }

    #[test]
    fn generic_settings_reject_path_and_authentication_type() {
        for extra in ["path = \"/x\"", "authentication_type = \"http_basic\""] {
            let settings =
                KeychainSettings::from_toml_str(&format!("service = \"mail\"\n{extra}")).unwrap();
            let err = settings.into_configuration().unwrap_err();
            assert!(matches!(err, KeychainError::Settings { .. }), "{extra}: {err:?}");
        }
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let err = KeychainSettings::from_toml_str(r#"servce = "typo""#).unwrap_err();
        assert!(matches!(err, KeychainError::Settings { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NETWORK.as_bytes()).unwrap();

        let settings = KeychainSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.server.as_deref(), Some("example.com"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeychainSettings::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, KeychainError::Io(_)));
    }

    #[test]
    fn overrides_replace_non_empty_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_SERVICE, "override"),
            (ENV_ACCESS_GROUP, "  "),
        ]
        .into_iter()
        .collect();

        let mut settings = KeychainSettings {
            service: Some("original".into()),
            access_group: Some("group".into()),
            ..Default::default()
        };
        settings.apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.service.as_deref(), Some("override"));
        assert_eq!(settings.access_group.as_deref(), Some("group"));
        assert_eq!(settings.server, None);
    }

    #[test]
    fn serializes_back_to_toml() {
        let settings = KeychainSettings::from_toml_str(NETWORK).unwrap();
        let text = settings.to_toml_string().unwrap();
        assert_eq!(KeychainSettings::from_toml_str(&text).unwrap(), settings);
    }
}
