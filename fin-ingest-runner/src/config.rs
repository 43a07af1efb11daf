//! Layered TOML configuration.
//!
//! Resolution order, later layers win and tables merge deeply:
//! 1. Base file `fin-ingest.toml`
//! 2. Profile file `task/<profile>.toml` next to the base file
//! 3. Environment overrides `FIN_INGEST__SECTION__KEY=value`
//!
//! The base file is `$FIN_INGEST_CONFIG_FILE` when set. Otherwise it is
//! looked up in `$FIN_INGEST_CONFIG_DIR`, or in the first existing default
//! directory.
//!
//! Keys are read case- and dash-insensitively: `logLevel`, `log-level` and
//! `log_level` all name the same setting, in files and environment alike.

use fin_ingest_core::api::finam::TIME_FRAME_DAILY;
use fin_ingest_core::api::FINAM_API_BASE_URL;
use fin_ingest_core::sql::connect::number_or_string;
use fin_ingest_core::sql::DbParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};
use tracing::debug;

pub const CONFIG_FILE_ENV: &str = "FIN_INGEST_CONFIG_FILE";
pub const CONFIG_DIR_ENV: &str = "FIN_INGEST_CONFIG_DIR";
pub const ENV_OVERRIDE_PREFIX: &str = "FIN_INGEST__";

const CONFIG_FILE: &str = "fin-ingest.toml";
const PROFILE_DIR: &str = "task";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[source] toml::de::Error),

    #[error("missing setting: {0}")]
    Missing(&'static str),

    #[error("token file {0} is empty")]
    EmptyToken(PathBuf),
}

/// A `tickers`/`patterns` entry given either as one string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Which assets of one exchange to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSearch {
    /// Market identifier code, e.g. `MISX`.
    pub mic: String,
    /// Exact tickers.
    #[serde(default, deserialize_with = "one_or_many")]
    pub tickers: Vec<String>,
    /// Regular expressions searched in asset names.
    #[serde(default, deserialize_with = "one_or_many")]
    pub patterns: Vec<String>,
}

/// Typed settings shared by all tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub db: DbParams,
    /// Accounts database (`acc-db`); falls back to `db` when absent.
    pub acc_db: Option<DbParams>,
    /// File whose first line is the API secret.
    pub token_file: Option<PathBuf>,
    pub api_base_url: String,
    pub assets: Vec<AssetSearch>,
    pub time_frame: String,
    /// Default period length, in days before today.
    #[serde(deserialize_with = "number_or_string")]
    pub lookback_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            db: DbParams::default(),
            acc_db: None,
            token_file: None,
            api_base_url: FINAM_API_BASE_URL.to_string(),
            assets: Vec::new(),
            time_frame: TIME_FRAME_DAILY.to_string(),
            lookback_days: 10,
        }
    }
}

impl Settings {
    /// Resolve settings for `profile` from the process environment.
    pub fn load(profile: Option<&str>) -> Result<Self, ConfigError> {
        let sources = ConfigSources::locate(
            |name| std::env::var(name).ok(),
            &default_config_dirs(),
        );
        Self::load_from(&sources, profile, std::env::vars())
    }

    /// Resolve settings from explicit sources and environment variables.
    pub fn load_from(
        sources: &ConfigSources,
        profile: Option<&str>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut merged = Table::new();

        if let Some(base) = &sources.base_file {
            debug!("Loading config: {}", base.display());
            merge_tables(&mut merged, read_table(base)?);
        }

        if let (Some(profile), Some(dir)) = (profile, &sources.dir) {
            let path = dir.join(PROFILE_DIR).join(format!("{profile}.toml"));
            if path.is_file() {
                debug!("Loading profile config: {}", path.display());
                merge_tables(&mut merged, read_table(&path)?);
            }
        }

        apply_env_overrides(&mut merged, env);

        Settings::deserialize(Value::Table(merged)).map_err(ConfigError::Invalid)
    }

    /// Connection parameters for the accounts database.
    pub fn accounts_db(&self) -> &DbParams {
        self.acc_db.as_ref().unwrap_or(&self.db)
    }

    /// The API secret: first line of `token_file`.
    pub fn read_secret(&self) -> Result<String, ConfigError> {
        let path = self
            .token_file
            .as_deref()
            .ok_or(ConfigError::Missing("token_file"))?;
        read_secret(path)
    }
}

/// Where configuration files were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub base_file: Option<PathBuf>,
    /// Directory searched for profile files.
    pub dir: Option<PathBuf>,
}

impl ConfigSources {
    /// Locate configuration using `env` for variable lookup.
    pub fn locate(env: impl Fn(&str) -> Option<String>, default_dirs: &[PathBuf]) -> Self {
        if let Some(file) = env(CONFIG_FILE_ENV) {
            let file = PathBuf::from(file);
            let dir = file.parent().map(Path::to_path_buf);
            return Self {
                base_file: Some(file),
                dir,
            };
        }

        let dir = env(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| default_dirs.iter().find(|d| d.is_dir()).cloned());

        let base_file = dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE))
            .filter(|f| f.is_file());

        Self { base_file, dir }
    }
}

/// `/opt/fin-ingest/config`, `/etc/fin-ingest`, then the user config dir.
pub fn default_config_dirs() -> Vec<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/fin-ingest/config"),
        PathBuf::from("/etc/fin-ingest"),
    ];
    if let Some(user) = dirs::config_dir() {
        candidates.push(user.join("fin-ingest"));
    }
    candidates
}

/// Read the first line of a secret file.
pub fn read_secret(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .lines()
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::EmptyToken(path.to_path_buf()))
}

fn read_table(path: &Path) -> Result<Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(canonical_table(table))
}

/// `logLevel`, `log-level` -> `log_level`; `apiBaseURL` -> `api_base_url`.
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch == '-' {
            out.push('_');
        } else if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
    }
    out
}

fn canonical_table(table: Table) -> Table {
    table
        .into_iter()
        .map(|(key, value)| (canonical_key(&key), canonical_value(value)))
        .collect()
}

fn canonical_value(value: Value) -> Value {
    match value {
        Value::Table(t) => Value::Table(canonical_table(t)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_value).collect()),
        other => other,
    }
}

/// Merge `overlay` into `base`. Nested tables merge, everything else is replaced.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply `FIN_INGEST__SECTION__KEY=value` variables.
///
/// Values are always inserted as strings; numeric settings parse them.
pub fn apply_env_overrides(table: &mut Table, env: impl IntoIterator<Item = (String, String)>) {
    let mut overrides: Vec<(Vec<String>, String)> = env
        .into_iter()
        .filter_map(|(name, value)| {
            let path = name.strip_prefix(ENV_OVERRIDE_PREFIX)?;
            let keys: Vec<String> = path
                .split("__")
                .map(|k| canonical_key(&k.to_ascii_lowercase()))
                .collect();
            if keys.iter().any(String::is_empty) {
                return None;
            }
            Some((keys, value))
        })
        .collect();
    overrides.sort();

    for (keys, raw) in overrides {
        debug!("Config override from environment: {}", keys.join("."));
        set_path(table, &keys, &raw);
    }
}

fn set_path(table: &mut Table, keys: &[String], raw: &str) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = table;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert(Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        let Value::Table(next) = entry else {
            return;
        };
        current = next;
    }

    current.insert(last.clone(), Value::String(raw.to_string()));
}
