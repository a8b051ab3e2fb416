//! Runtime settings: storage root, key prefix, chart endpoint, API token.
//!
//! Loaded from a TOML file, then overridden by `CHARTFLOW_*` environment
//! variables:
//!
//! ```toml
//! store_root = "data"
//! prefix = "iex"
//! endpoint = "https://cloud.iexapis.com/stable"
//! token = "pk_..."
//! event_bus = "iex-ingestion"
//! ```
//!
//! `endpoint` and `token` may be omitted for commands that never call the
//! chart API.

use crate::error::{IngestError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_STORE_ROOT: &str = "CHARTFLOW_STORE_ROOT";
pub const ENV_PREFIX: &str = "CHARTFLOW_PREFIX";
pub const ENV_ENDPOINT: &str = "CHARTFLOW_ENDPOINT";
pub const ENV_TOKEN: &str = "CHARTFLOW_TOKEN";
pub const ENV_EVENT_BUS: &str = "CHARTFLOW_EVENT_BUS";

pub const DEFAULT_EVENT_BUS: &str = "iex-ingestion";

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory backing the object store.
    pub store_root: PathBuf,
    /// Key prefix every object lives under.
    pub prefix: String,
    /// Chart API base URL. Only the fetching commands need it.
    pub endpoint: Option<String>,
    pub token: Option<String>,
    /// Name stamped on published events.
    pub event_bus: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("store_root", &self.store_root)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

/// Every field optional so file and environment can each fill a part.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialSettings {
    store_root: Option<PathBuf>,
    prefix: Option<String>,
    endpoint: Option<String>,
    token: Option<String>,
    event_bus: Option<String>,
}

impl PartialSettings {
    fn overlay(self, other: PartialSettings) -> PartialSettings {
        PartialSettings {
            store_root: other.store_root.or(self.store_root),
            prefix: other.prefix.or(self.prefix),
            endpoint: other.endpoint.or(self.endpoint),
            token: other.token.or(self.token),
            event_bus: other.event_bus.or(self.event_bus),
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PartialSettings {
        PartialSettings {
            store_root: lookup(ENV_STORE_ROOT).map(PathBuf::from),
            prefix: lookup(ENV_PREFIX),
            endpoint: lookup(ENV_ENDPOINT),
            token: lookup(ENV_TOKEN),
            event_bus: lookup(ENV_EVENT_BUS),
        }
    }

    fn finish(self) -> Result<Settings> {
        let missing = |name: &str| {
            IngestError::Configuration(format!("missing required setting '{name}'"))
        };
        Ok(Settings {
            store_root: self.store_root.ok_or_else(|| missing("store_root"))?,
            prefix: self.prefix.unwrap_or_default(),
            endpoint: self.endpoint,
            token: self.token,
            event_bus: self
                .event_bus
                .unwrap_or_else(|| DEFAULT_EVENT_BUS.to_string()),
        })
    }
}

fn parse_toml(content: &str) -> Result<PartialSettings> {
    toml::from_str(content)
        .map_err(|e| IngestError::Configuration(format!("parse settings TOML: {e}")))
}

impl Settings {
    /// Parse settings from a TOML string alone.
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_toml(content)?.finish()
    }

    /// Resolve settings from an optional TOML file plus an environment lookup.
    pub fn resolve(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let base = match file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    IngestError::Configuration(format!("read settings {}: {e}", path.display()))
                })?;
                parse_toml(&content)?
            }
            None => PartialSettings::default(),
        };
        base.overlay(PartialSettings::from_lookup(env)).finish()
    }

    /// Chart API endpoint and token, required before any fetch.
    pub fn api_credentials(&self) -> Result<(&str, &str)> {
        let missing = |name: &str| {
            IngestError::Configuration(format!(
                "missing required setting '{name}' for chart API access"
            ))
        };
        let endpoint = self.endpoint.as_deref().ok_or_else(|| missing("endpoint"))?;
        let token = self.token.as_deref().ok_or_else(|| missing("token"))?;
        Ok((endpoint, token))
    }

    /// Resolve settings against the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::resolve(file, |name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
        store_root = "data"
        prefix = "iex"
        endpoint = "https://cloud.example.com/stable"
        token = "pk_file"
    "#;

    #[test]
    fn parse_full_toml() {
        let s = Settings::from_toml(FULL).unwrap();
        assert_eq!(s.store_root, PathBuf::from("data"));
        assert_eq!(s.prefix, "iex");
        assert_eq!(s.event_bus, DEFAULT_EVENT_BUS);
    }

    #[test]
    fn missing_store_root_is_configuration_error() {
        let err = Settings::from_toml("endpoint = \"e\"\ntoken = \"t\"").unwrap_err();
        assert!(matches!(err, IngestError::Configuration(ref m) if m.contains("store_root")));
    }

    #[test]
    fn api_settings_are_only_required_for_api_access() {
        let s = Settings::from_toml("store_root = \"d\"\nendpoint = \"e\"").unwrap();
        assert_eq!(s.store_root, PathBuf::from("d"));

        let err = s.api_credentials().unwrap_err();
        assert!(matches!(err, IngestError::Configuration(ref m) if m.contains("token")));

        let full = Settings::from_toml(FULL).unwrap();
        assert_eq!(
            full.api_credentials().unwrap(),
            ("https://cloud.example.com/stable", "pk_file")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_toml(&format!("{FULL}\nbucket = \"x\"")).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chartflow.toml");
        std::fs::write(&path, FULL).unwrap();

        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_TOKEN, "pk_env"), (ENV_EVENT_BUS, "other-bus")]);
        let s = Settings::resolve(Some(&path), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(s.token.as_deref(), Some("pk_env"));
        assert_eq!(s.event_bus, "other-bus");
        assert_eq!(s.prefix, "iex");
    }

    #[test]
    fn environment_alone_is_enough() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORE_ROOT, "/tmp/store"),
            (ENV_ENDPOINT, "http://localhost"),
            (ENV_TOKEN, "t"),
        ]);
        let s = Settings::resolve(None, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.prefix, "");
    }

    #[test]
    fn debug_redacts_token() {
        let s = Settings::from_toml(FULL).unwrap();
        let shown = format!("{s:?}");
        assert!(!shown.contains("pk_file"));
        assert!(shown.contains("<redacted>"));
    }
}
