//! Configuration loading and root folder resolution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::catalog::{default_quota, QuotaTarget};
use crate::segment::Segment;
use crate::{Error, Result};

/// Env var naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "GSS_CONFIG";

/// Env var overriding the data directory
pub const ROOT_FOLDER_ENV_VAR: &str = "GSS_ROOT_FOLDER";

pub const ADMIN_USERNAME_ENV_VAR: &str = "GSS_ADMIN_USERNAME";
pub const ADMIN_PASSWORD_ENV_VAR: &str = "GSS_ADMIN_PASSWORD";

/// Database file inside the root folder
pub const DB_FILE_NAME: &str = "gss.db";

/// Bootstrap configuration read from gss.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// TOML file of `[[zip]]` entries describing the trade area
    #[serde(default)]
    pub trade_area_file: Option<PathBuf>,
    /// Per-segment overrides keyed by segment name
    #[serde(default)]
    pub quotas: BTreeMap<String, QuotaOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Dashboard listen port
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaOverride {
    pub min: i64,
    pub max: i64,
}

/// Dashboard login credentials after env overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// One trade-area ZIP code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipEntry {
    pub code: String,
    pub dma: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct TradeAreaFile {
    #[serde(default)]
    zip: Vec<ZipEntry>,
}

/// Locate the config file.
///
/// Priority: explicit path (CLI), `GSS_CONFIG`, `~/.config/gss/gss.toml`,
/// `/etc/gss/gss.toml`. Returns None when no file exists.
pub fn find_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("gss").join("gss.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/gss/gss.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Parse a config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if one is found, defaults otherwise
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    match find_config_file(cli_path) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            debug!("No configuration file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gss"))
        .unwrap_or_else(|| PathBuf::from("./gss_data"))
}

/// Database path inside a root folder
pub fn db_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DB_FILE_NAME)
}

/// Quota bounds for every segment, defaults overlaid with TOML overrides.
///
/// Unknown segment names and min > max are configuration errors.
pub fn quota_targets(config: &TomlConfig) -> Result<Vec<(Segment, QuotaTarget)>> {
    for name in config.quotas.keys() {
        name.parse::<Segment>()
            .map_err(|_| Error::Config(format!("Unknown quota segment: {}", name)))?;
    }

    Segment::ALL
        .into_iter()
        .map(|segment| {
            let target = match config.quotas.get(segment.as_str()) {
                Some(o) => QuotaTarget {
                    min: o.min,
                    max: o.max,
                },
                None => default_quota(segment),
            };
            if target.min < 0 || target.min > target.max {
                return Err(Error::Config(format!(
                    "Quota for {} must satisfy 0 <= min <= max (min {}, max {})",
                    segment, target.min, target.max
                )));
            }
            Ok((segment, target))
        })
        .collect()
}

/// Dashboard credentials: env vars override TOML; None when either half is missing
pub fn admin_credentials(config: &TomlConfig) -> Option<AdminCredentials> {
    let username = std::env::var(ADMIN_USERNAME_ENV_VAR)
        .ok()
        .or_else(|| config.admin.username.clone())?;
    let password = std::env::var(ADMIN_PASSWORD_ENV_VAR)
        .ok()
        .or_else(|| config.admin.password.clone())?;

    if username.trim().is_empty() || password.is_empty() {
        return None;
    }
    Some(AdminCredentials { username, password })
}

/// Read a trade-area file of `[[zip]]` entries
pub fn load_trade_area(path: &Path) -> Result<Vec<ZipEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let parsed: TradeAreaFile = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    for entry in &parsed.zip {
        if !is_zip_format(&entry.code) {
            return Err(Error::Config(format!(
                "Trade area ZIP must be 5 digits: {:?}",
                entry.code
            )));
        }
    }
    Ok(parsed.zip)
}

/// Five ASCII digits
pub fn is_zip_format(code: &str) -> bool {
    code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit())
}
