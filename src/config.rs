#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DAYS_BACK: u32 = 90;
pub const DEFAULT_DB_PATH: &str = "youtube.db";
pub const DEFAULT_EXPORT_DIR: &str = "data";

/// Filesystem locations shared by both binaries: where the SQLite database
/// lives and where CSV exports are written.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
}

/// Everything an ingest run needs, resolved once at startup and passed by
/// reference into every component.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub api_key: String,
    pub channel_id: String,
    pub days_back: u32,
    pub storage: StoragePaths,
}

/// Command-line overrides applied on top of the environment/config file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub env_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub days_back: Option<u32>,
}

/// Resolves the full ingest configuration. `API_KEY` and `CHANNEL_ID` are
/// required; everything else falls back to a default.
pub fn resolve_ingest_settings(overrides: SettingsOverrides) -> Result<IngestSettings> {
    let env_path = effective_env_path(&overrides);
    let file_vars = read_env_file(&env_path)?;
    build_ingest_settings(&file_vars, env_var_string, &env_path, overrides)
}

/// Resolves just the storage locations. Used by `export_reports`, which
/// never needs API credentials.
pub fn resolve_storage_paths(overrides: SettingsOverrides) -> Result<StoragePaths> {
    let env_path = effective_env_path(&overrides);
    let file_vars = read_env_file(&env_path)?;
    Ok(build_storage_paths(&file_vars, env_var_string, overrides))
}

fn effective_env_path(overrides: &SettingsOverrides) -> PathBuf {
    overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH))
}

fn build_ingest_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    env_path: &Path,
    overrides: SettingsOverrides,
) -> Result<IngestSettings> {
    let api_key = lookup_value("API_KEY", file_vars, &env_lookup)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            anyhow!(
                "API_KEY not set (checked the process environment and {})",
                env_path.display()
            )
        })?;
    let channel_id = lookup_value("CHANNEL_ID", file_vars, &env_lookup)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            anyhow!(
                "CHANNEL_ID not set (checked the process environment and {})",
                env_path.display()
            )
        })?;
    let days_back = overrides
        .days_back
        .or_else(|| {
            lookup_value("DEFAULT_DAYS_BACK", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u32>().ok())
        })
        .unwrap_or(DEFAULT_DAYS_BACK);
    let storage = build_storage_paths(file_vars, env_lookup, overrides);

    Ok(IngestSettings {
        api_key,
        channel_id,
        days_back,
        storage,
    })
}

fn build_storage_paths(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> StoragePaths {
    let db_path = overrides
        .db_path
        .or_else(|| lookup_value("DB_PATH", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    let export_dir = overrides
        .export_dir
        .or_else(|| lookup_value("EXPORT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR));

    StoragePaths {
        db_path,
        export_dir,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

/// Parses a `.env`-style file into a key/value map. A missing file is not an
/// error: required keys may still arrive through the process environment, and
/// the resolver reports which keys are absent.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
