//! Environment-driven inputs the node needs before any database-stored layer
//! can be read: where the repo lives, which layers to apply, where to listen
//! and how to reach the database.

use std::env;
use std::path::PathBuf;

use reqwest::Url;
use thiserror::Error;

const DEFAULT_REPO_PATH: &str = "~/.provider-node";
const DEFAULT_LISTEN: &str = "0.0.0.0:12300";

/// Database connection parameters. Hosts are tried in order.
#[derive(Clone, PartialEq, Eq)]
pub struct HarmonyDbConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for HarmonyDbConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            port: 5433,
            username: "yugabyte".to_string(),
            password: "yugabyte".to_string(),
            database: "yugabyte".to_string(),
        }
    }
}

impl HarmonyDbConfig {
    /// Connection URL for a single host. Credentials are percent-encoded.
    pub fn url_for(&self, host: &str) -> Result<String, ConfigError> {
        let invalid = || ConfigError::InvalidDbUrl {
            host: host.to_string(),
        };
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let mut url = Url::parse(&format!(
            "postgres://{authority}:{}/{}",
            self.port, self.database
        ))
        .map_err(|_| invalid())?;
        url.set_username(&self.username).map_err(|_| invalid())?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid())?;
        Ok(url.into())
    }
}

impl std::fmt::Debug for HarmonyDbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarmonyDbConfig")
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Plain values handed to the bootstrapper by the process entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapInputs {
    repo_path: PathBuf,
    layers: Vec<String>,
    listen: String,
    storage_json: PathBuf,
    journal_path: PathBuf,
    db: HarmonyDbConfig,
    make_repo: bool,
}

impl BootstrapInputs {
    pub fn new(repo_path: impl Into<PathBuf>, layers: Vec<String>, listen: impl Into<String>) -> Self {
        let repo_path = repo_path.into();
        Self {
            storage_json: repo_path.join("storage.json"),
            journal_path: repo_path.join("journal"),
            repo_path,
            layers,
            listen: listen.into(),
            db: HarmonyDbConfig::default(),
            make_repo: true,
        }
    }

    /// Reads `PROVIDER_*` variables after hydrating `.env` (if present).
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let repo_path = expand_home(
            &get_optional_var("PROVIDER_REPO_PATH").unwrap_or_else(|| DEFAULT_REPO_PATH.into()),
        );
        let layers = match get_optional_var("PROVIDER_LAYERS") {
            Some(raw) => split_list(&raw),
            None => vec![crate::config::BASE_LAYER.to_string()],
        };
        if layers.is_empty() {
            return Err(ConfigError::EmptyList {
                key: "PROVIDER_LAYERS",
            });
        }
        let listen = get_optional_var("PROVIDER_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.into());

        let mut inputs = Self::new(repo_path, layers, listen);
        if let Some(path) = get_optional_var("PROVIDER_STORAGE_JSON") {
            inputs.storage_json = expand_home(&path);
        }
        if let Some(path) = get_optional_var("PROVIDER_JOURNAL") {
            inputs.journal_path = expand_home(&path);
        }
        if let Some(flag) = get_optional_var("PROVIDER_MAKE_REPO") {
            inputs.make_repo = parse_bool("PROVIDER_MAKE_REPO", &flag)?;
        }

        let defaults = HarmonyDbConfig::default();
        let hosts = get_optional_var("PROVIDER_DB_HOST")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.hosts);
        if hosts.is_empty() {
            return Err(ConfigError::EmptyList {
                key: "PROVIDER_DB_HOST",
            });
        }
        let port = match get_optional_var("PROVIDER_DB_PORT") {
            Some(raw) => raw.parse().map_err(|source| ConfigError::InvalidNumber {
                key: "PROVIDER_DB_PORT",
                source,
            })?,
            None => defaults.port,
        };
        inputs.db = HarmonyDbConfig {
            hosts,
            port,
            username: get_optional_var("PROVIDER_DB_USER").unwrap_or(defaults.username),
            password: get_optional_var("PROVIDER_DB_PASSWORD").unwrap_or(defaults.password),
            database: get_optional_var("PROVIDER_DB_NAME").unwrap_or(defaults.database),
        };

        Ok(inputs)
    }

    pub fn with_storage_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_json = path.into();
        self
    }

    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = path.into();
        self
    }

    pub fn with_db(mut self, db: HarmonyDbConfig) -> Self {
        self.db = db;
        self
    }

    pub fn with_make_repo(mut self, make_repo: bool) -> Self {
        self.make_repo = make_repo;
        self
    }

    pub fn repo_path(&self) -> &PathBuf {
        &self.repo_path
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn storage_json(&self) -> &PathBuf {
        &self.storage_json
    }

    pub fn journal_path(&self) -> &PathBuf {
        &self.journal_path
    }

    pub fn db(&self) -> &HarmonyDbConfig {
        &self.db
    }

    pub fn make_repo(&self) -> bool {
        self.make_repo
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("PROVIDER_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`{key}` must list at least one entry")]
    EmptyList { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("cannot build a database url for host `{host}`")]
    InvalidDbUrl { host: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
