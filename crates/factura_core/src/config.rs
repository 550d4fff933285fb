//! Backend selection from the process environment.
//!
//! # Responsibility
//! - Resolve which store backend to use and how to reach it.
//! - Build the chosen `StoreAdapter` once at startup.
//!
//! # Invariants
//! - Blank variables are treated as unset.
//! - The per-call deadline is always strictly positive.

use crate::db::DbError;
use crate::service::DEFAULT_STORE_TIMEOUT;
use crate::store::embedded::SqliteStore;
use crate::store::remote::{RemoteStore, TransportError};
use crate::store::{DynStore, StoreAdapter};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_BACKEND: &str = "FACTURA_BACKEND";
pub const ENV_DB_PATH: &str = "FACTURA_DB_PATH";
pub const ENV_API_URL: &str = "FACTURA_API_URL";
pub const ENV_API_TOKEN: &str = "FACTURA_API_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "FACTURA_TIMEOUT_MS";

const DEFAULT_DB_FILE_NAME: &str = "factura.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Local SQLite file.
    Embedded { db_path: PathBuf },
    /// Remote JSON service.
    Remote {
        api_url: String,
        api_token: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Deadline applied to every store call.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Embedded {
                db_path: default_db_path(),
            },
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// `FACTURA_BACKEND` holds an unknown value.
    UnknownBackend(String),
    /// Remote backend selected without `FACTURA_API_URL`.
    MissingApiUrl,
    /// `FACTURA_TIMEOUT_MS` is not a positive integer.
    InvalidTimeout(String),
    /// Embedded database could not be opened.
    Database(DbError),
    /// Remote client could not be constructed.
    Transport(TransportError),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownBackend(_) | Self::MissingApiUrl | Self::InvalidTimeout(_) => {
                "invalid_config"
            }
            Self::Database(_) | Self::Transport(_) => "store_unavailable",
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownBackend(value) => write!(
                f,
                "unsupported {ENV_BACKEND} `{value}`; expected `embedded` or `remote`"
            ),
            Self::MissingApiUrl => write!(f, "{ENV_API_URL} is required for the remote backend"),
            Self::InvalidTimeout(value) => write!(
                f,
                "{ENV_TIMEOUT_MS} must be a positive integer, got `{value}`"
            ),
            Self::Database(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Database(err) => Some(err),
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Database(value)
    }
}

impl From<TransportError> for ConfigError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl StoreConfig {
    /// Reads the `FACTURA_*` variables of the current process.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout = match read(ENV_TIMEOUT_MS) {
            None => DEFAULT_STORE_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        let backend = match read(ENV_BACKEND)
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("embedded") => BackendConfig::Embedded {
                db_path: read(ENV_DB_PATH)
                    .map(PathBuf::from)
                    .unwrap_or_else(default_db_path),
            },
            Some("remote") => BackendConfig::Remote {
                api_url: read(ENV_API_URL)
                    .map(|url| url.trim_end_matches('/').to_string())
                    .ok_or(ConfigError::MissingApiUrl)?,
                api_token: read(ENV_API_TOKEN),
            },
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        Ok(Self { backend, timeout })
    }
}

/// Builds the configured store adapter.
///
/// # Side effects
/// - Embedded: opens (and migrates) the SQLite file.
/// - Emits `store_open` logging events.
pub fn open_store(config: &StoreConfig) -> Result<DynStore, ConfigError> {
    let store: DynStore = match &config.backend {
        BackendConfig::Embedded { db_path } => Arc::new(SqliteStore::open(db_path)?),
        BackendConfig::Remote { api_url, api_token } => Arc::new(RemoteStore::http(
            api_url.as_str(),
            api_token.clone(),
            config.timeout,
        )?),
    };
    info!(
        "event=store_open module=config status=ok backend={} timeout_ms={}",
        store.backend_tag(),
        config.timeout.as_millis()
    );
    Ok(store)
}

fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::{open_store, BackendConfig, ConfigError, StoreConfig};
    use crate::store::StoreAdapter;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(pairs: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        StoreConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_selects_embedded_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn remote_backend_trims_trailing_slash_and_keeps_token() {
        let config = config_from(&[
            ("FACTURA_BACKEND", "Remote"),
            ("FACTURA_API_URL", "http://localhost:3000/"),
            ("FACTURA_API_TOKEN", "secret"),
            ("FACTURA_TIMEOUT_MS", "2500"),
        ])
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Remote {
                api_url: "http://localhost:3000".to_string(),
                api_token: Some("secret".to_string()),
            }
        );
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn remote_backend_requires_api_url() {
        let err = config_from(&[("FACTURA_BACKEND", "remote"), ("FACTURA_API_URL", "  ")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiUrl));
    }

    #[test]
    fn zero_or_garbage_timeout_is_rejected() {
        for raw in ["0", "-5", "soon"] {
            let err = config_from(&[("FACTURA_TIMEOUT_MS", raw)]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTimeout(_)), "{raw}");
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = config_from(&[("FACTURA_BACKEND", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(value) if value == "postgres"));
        assert_eq!(
            config_from(&[("FACTURA_BACKEND", "ftp")]).unwrap_err().code(),
            "invalid_config"
        );
    }

    #[test]
    fn opens_embedded_store_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let db_path: PathBuf = dir.path().join("books.sqlite3");
        let config = config_from(&[("FACTURA_DB_PATH", db_path.to_str().unwrap())]).unwrap();

        let store = open_store(&config).unwrap();
        assert_eq!(store.backend_tag(), "sqlite");
        assert!(db_path.exists());
    }
}
