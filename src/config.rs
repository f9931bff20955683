//! Application configuration.
//!
//! Configuration is loaded from the first file found among:
//! 1. the `--config` command-line argument
//! 2. `$ATTACHMENT_ARCHIVER_CONFIG` (environment variable)
//! 3. `~/.config/attachment-archiver/config.toml` (Linux/macOS)
//!    `%APPDATA%\attachment-archiver\config.toml` (Windows)
//! 4. `./config.toml`, then `./config.json`
//!
//! Files ending in `.json` use the legacy layout
//! `{"login_info": {...}, "storage_root": "..."}`; everything else is TOML
//! with the same field names. `ARCHIVER_*` environment variables override
//! the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::model::options::{ArchiveOptions, CharsetStrategy, MissingSenderPolicy};
use crate::parser::charset::{is_known_charset, DEFAULT_CHARSET};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ATTACHMENT_ARCHIVER_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the archive.
    pub storage_root: Option<PathBuf>,
    /// Server and credentials.
    pub login_info: LoginConfig,
    /// What to archive and how.
    pub archive: ArchiveConfig,
    /// Logging.
    pub general: GeneralConfig,
    /// File the configuration was read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Server and credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// IMAP host, also used as the TLS server name.
    pub server: String,
    /// IMAPS port.
    pub port: u16,
    /// Login name, usually the email address.
    #[serde(alias = "username")]
    pub email_address: String,
    /// Password or app-specific password.
    pub password: String,
}

/// What to archive and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Mailbox to select.
    pub mailbox: String,
    /// IMAP `SEARCH` criterion, e.g. `"ALL"` or `"UNSEEN"`.
    pub search_query: String,
    /// `"sniffed"` or `"declared"`.
    pub charset_strategy: CharsetStrategy,
    /// Charset assumed when sniffing finds no `charset=` marker.
    pub default_charset: String,
    /// `"skip"` or `"abort"`.
    pub on_missing_sender: MissingSenderPolicy,
    /// Flag archived messages `\Deleted`.
    pub delete_after_archive: bool,
    /// Expunge at the end of the run.
    pub expunge: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory of the log file.
    pub log_dir: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 993,
            email_address: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("email_address", &self.email_address)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            search_query: "ALL".to_string(),
            charset_strategy: CharsetStrategy::default(),
            default_charset: DEFAULT_CHARSET.to_string(),
            on_missing_sender: MissingSenderPolicy::default(),
            delete_after_archive: false,
            expunge: false,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Check that everything needed to connect and write is present.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("login_info.server", self.login_info.server.trim().is_empty()),
            (
                "login_info.email_address",
                self.login_info.email_address.trim().is_empty(),
            ),
            ("login_info.password", self.login_info.password.is_empty()),
            (
                "storage_root",
                self.storage_root
                    .as_ref()
                    .map_or(true, |p| p.as_os_str().is_empty()),
            ),
        ];
        let missing: Vec<&str> = missing
            .iter()
            .filter(|(_, is_missing)| *is_missing)
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ArchiveError::Config(format!(
                "missing required setting(s): {}",
                missing.join(", ")
            )));
        }

        if self.login_info.port == 0 {
            return Err(ArchiveError::Config("login_info.port must not be 0".into()));
        }
        if !is_known_charset(&self.archive.default_charset) {
            return Err(ArchiveError::UnsupportedEncoding(
                self.archive.default_charset.clone(),
            ));
        }
        Ok(())
    }

    /// Options for the extractor. Call [`Config::validate`] first.
    pub fn archive_options(&self) -> Result<ArchiveOptions> {
        let storage_root = self
            .storage_root
            .clone()
            .ok_or_else(|| ArchiveError::Config("storage_root is not set".into()))?;
        Ok(ArchiveOptions {
            storage_root,
            search_query: self.archive.search_query.clone(),
            charset_strategy: self.archive.charset_strategy,
            default_charset: self.archive.default_charset.clone(),
            on_missing_sender: self.archive.on_missing_sender,
            delete_after_archive: self.archive.delete_after_archive,
            expunge: self.archive.expunge,
        })
    }

    /// Apply `ARCHIVER_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(server) = lookup("ARCHIVER_SERVER") {
            self.login_info.server = server;
        }
        if let Some(port) = lookup("ARCHIVER_PORT") {
            self.login_info.port = port.trim().parse().map_err(|e| {
                ArchiveError::Config(format!("ARCHIVER_PORT '{port}' is not a port: {e}"))
            })?;
        }
        if let Some(user) = lookup("ARCHIVER_USERNAME") {
            self.login_info.email_address = user;
        }
        if let Some(password) = lookup("ARCHIVER_PASSWORD") {
            self.login_info.password = password;
        }
        if let Some(root) = lookup("ARCHIVER_STORAGE_ROOT") {
            self.storage_root = Some(PathBuf::from(root));
        }
        Ok(())
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration from `explicit` or the standard locations, then apply
/// environment overrides.
///
/// A missing file yields the defaults; an unreadable or malformed file is an
/// error, since credentials would otherwise be silently dropped. Nothing is
/// logged here: this runs before the subscriber exists.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    load_config_with(explicit, |name| std::env::var(name).ok())
}

/// [`load_config`] with environment lookups routed through `lookup`.
pub fn load_config_with(
    explicit: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ArchiveError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => candidate_paths().into_iter().find(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            let contents =
                std::fs::read_to_string(&path).map_err(|e| ArchiveError::io(&path, e))?;
            let mut cfg = parse_config(&contents, is_json(&path)).map_err(|e| {
                ArchiveError::Config(format!("{}: {e}", path.display()))
            })?;
            cfg.source = Some(path);
            cfg
        }
        None => Config::default(),
    };

    config.apply_env_overrides(lookup)?;
    Ok(config)
}

/// Parse configuration text as JSON or TOML.
pub fn parse_config(contents: &str, json: bool) -> std::result::Result<Config, String> {
    if json {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    } else {
        toml::from_str(contents).map_err(|e| e.to_string())
    }
}

/// Save configuration as TOML.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("attachment-archiver").join("config.toml"))
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = config_file_path().into_iter().collect();
    paths.push(PathBuf::from("config.toml"));
    paths.push(PathBuf::from("config.json"));
    paths
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Return the directory for log files.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("attachment-archiver")
}
