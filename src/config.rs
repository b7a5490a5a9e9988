//! Relay settings: store address, companion identifier and backend, with
//! `ACCOUNT_RELAY_*` environment overrides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub const DEFAULT_ADDRESS: &str = "content://com.leywin.accountunifier.provider/accounts";
pub const DEFAULT_COMPANION_ID: &str = "com.leywin.accountunifier";
pub const DEFAULT_DATABASE_FILE: &str = "account_relay.db";

pub const ENV_ADDRESS: &str = "ACCOUNT_RELAY_ADDRESS";
pub const ENV_COMPANION: &str = "ACCOUNT_RELAY_COMPANION";
pub const ENV_BACKEND: &str = "ACCOUNT_RELAY_BACKEND";
pub const ENV_DATABASE: &str = "ACCOUNT_RELAY_DB";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Keyring,
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Sqlite => "sqlite",
            Backend::Keyring => "keyring",
            Backend::Memory => "memory",
        })
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "keyring" => Ok(Backend::Keyring),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend `{other}` (expected sqlite, keyring or memory)")),
        }
    }
}

/// Relay settings. Every field has a default, so an empty config block is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub address: String,
    pub companion_id: String,
    pub backend: Backend,
    /// SQLite file; required when `backend` is `sqlite`.
    pub database_path: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            companion_id: DEFAULT_COMPANION_ID.to_string(),
            backend: Backend::default(),
            database_path: None,
        }
    }
}

impl RelayConfig {
    /// Applies `ACCOUNT_RELAY_*` environment overrides. Blank values are ignored.
    pub fn with_env_overrides(self) -> Result<Self, RelayError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RelayError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(address) = var(ENV_ADDRESS) {
            self.address = address;
        }
        if let Some(companion) = var(ENV_COMPANION) {
            self.companion_id = companion;
        }
        if let Some(backend) = var(ENV_BACKEND) {
            self.backend = backend.parse().map_err(RelayError::Config)?;
        }
        if let Some(path) = var(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Fills in `database_path` with the default file under `dir` when unset.
    pub fn with_default_database_in(mut self, dir: &Path) -> Self {
        if self.database_path.is_none() {
            self.database_path = Some(dir.join(DEFAULT_DATABASE_FILE));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_block_uses_defaults() {
        let config: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.backend, Backend::Sqlite);
    }

    #[test]
    fn reads_camel_case_block() {
        let config: RelayConfig = serde_json::from_str(
            r#"{"companionId":"com.example.companion","backend":"keyring"}"#,
        )
        .unwrap();
        assert_eq!(config.companion_id, "com.example.companion");
        assert_eq!(config.backend, Backend::Keyring);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn overrides_skip_blank_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_ADDRESS, "  "),
            (ENV_BACKEND, "Memory"),
            (ENV_DATABASE, "/tmp/relay.db"),
        ]);
        let config = RelayConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/relay.db")));
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = RelayConfig::default()
            .with_overrides(|k| (k == ENV_BACKEND).then(|| "postgres".to_string()))
            .unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn default_database_only_fills_gaps() {
        let dir = Path::new("/data/app");
        let filled = RelayConfig::default().with_default_database_in(dir);
        assert_eq!(filled.database_path, Some(dir.join(DEFAULT_DATABASE_FILE)));

        let explicit = RelayConfig {
            database_path: Some(PathBuf::from("/elsewhere.db")),
            ..RelayConfig::default()
        };
        assert_eq!(
            explicit.with_default_database_in(dir).database_path,
            Some(PathBuf::from("/elsewhere.db"))
        );
    }
}
