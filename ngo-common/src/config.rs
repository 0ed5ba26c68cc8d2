//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Missing files are not
//! fatal: a warning is logged and compiled defaults are used.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`NGO_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NGO_ROOT_FOLDER";

/// Environment variable overriding the TOML config file location
pub const CONFIG_FILE_ENV: &str = "NGO_CONFIG";

/// Name of the SQLite database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "ngo-site.db";

/// Name of the media (blob) directory inside the root folder
pub const MEDIA_DIR_NAME: &str = "media";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and media directory
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub uploads: UploadConfig,

    #[serde(default)]
    pub wizard: WizardConfig,

    /// Maximum time a write waits out SQLite lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub database_max_lock_wait_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Upload gate and blob store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file, in bytes
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Accepted MIME types
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,

    /// Blob upload timeout
    #[serde(default = "default_upload_timeout_secs")]
    pub timeout_secs: u64,

    /// URL prefix under which stored media is served
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

/// Upload wizard tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Delay before a manually entered slot number is checked
    #[serde(default = "default_check_debounce_ms")]
    pub check_debounce_ms: u64,

    /// Wizards idle longer than this are discarded
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_content_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "image/gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_upload_timeout_secs() -> u64 {
    60
}

fn default_public_base_url() -> String {
    "/media".to_string()
}

fn default_check_debounce_ms() -> u64 {
    300
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            uploads: UploadConfig::default(),
            wizard: WizardConfig::default(),
            database_max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_content_types: default_content_types(),
            timeout_secs: default_upload_timeout_secs(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            check_debounce_ms: default_check_debounce_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/ngo-site (or /var/lib/ngo-site for system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("ngo-site"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/ngo-site"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("ngo-site"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ngo-site"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("ngo-site"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ngo-site"))
        } else {
            PathBuf::from("./ngo_site_data")
        };

        Self {
            root_folder,
            log_level: default_log_level(),
        }
    }
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Command-line override (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// TOML-provided root folder (priority 3)
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Creates the root folder layout and hands out well-known paths
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create root and media directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        let media = self.media_path();
        if !media.exists() {
            std::fs::create_dir_all(&media)?;
            info!("Created media folder: {}", media.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn media_path(&self) -> PathBuf {
        self.root_folder.join(MEDIA_DIR_NAME)
    }
}

/// Locate the TOML config file for a module
///
/// `NGO_CONFIG` wins; otherwise the user config dir, then `/etc` on Linux.
/// The returned path may not exist.
pub fn config_file_path(module_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    let file_name = format!("{}.toml", module_name);
    let user_config = dirs::config_dir().map(|d| d.join("ngo-site").join(&file_name));

    if cfg!(target_os = "linux") {
        if let Some(path) = &user_config {
            if path.exists() {
                return path.clone();
            }
        }
        let system_config = PathBuf::from("/etc/ngo-site").join(&file_name);
        if system_config.exists() {
            return system_config;
        }
    }

    user_config.unwrap_or_else(|| PathBuf::from(file_name))
}

/// Load TOML config, falling back to defaults when the file is missing
///
/// A file that exists but fails to parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {} - using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    validate_config(&config)?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write TOML config (used by tooling and tests)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn validate_config(config: &TomlConfig) -> Result<()> {
    if config.uploads.max_bytes == 0 {
        return Err(Error::Config("uploads.max_bytes must be greater than 0".to_string()));
    }
    if config.uploads.allowed_content_types.is_empty() {
        return Err(Error::Config(
            "uploads.allowed_content_types must list at least one type".to_string(),
        ));
    }
    if config.uploads.timeout_secs == 0 {
        return Err(Error::Config("uploads.timeout_secs must be greater than 0".to_string()));
    }
    Ok(())
}
