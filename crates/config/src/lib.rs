//! Layered configuration for drivefs.
//!
//! Values are merged in order, later sources winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A config file (TOML, YAML or JSON, chosen by extension), either given
//!    explicitly or found at [`Config::default_path`]
//! 3. Environment variables prefixed with `DRIVEFS_`, nested keys separated
//!    by a double underscore (`DRIVEFS_DRIVER__CONDUIT_CAPACITY=1048576`)

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DRIVEFS_";
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
/// The Drive API refuses anything bigger.
pub const MAX_PAGE_SIZE: u32 = 1000;
/// 64KiB keeps a handful of network writes in flight without letting a fast
/// client buffer an entire upload in memory.
const DEFAULT_CONDUIT_CAPACITY: usize = 64 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub drive: DriveConfig,
    pub driver: DriverConfig,
}

/// Settings for the remote graph client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_url: String,
    pub upload_url: String,
    /// Objects requested per listing page.
    pub page_size: u32,
    /// OAuth2 client secret file. Handed to the authentication layer as-is.
    pub credentials_file: Option<PathBuf>,
}
impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            credentials_file: None,
        }
    }
}

/// Settings for the filesystem driver itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Bytes of upload content allowed in flight between a writer and the
    /// background upload before writes block.
    pub conduit_capacity: usize,
}
impl Default for DriverConfig {
    fn default() -> Self {
        Self { conduit_capacity: DEFAULT_CONDUIT_CAPACITY }
    }
}

impl Config {
    /// Where the config file lives when no path is given, if the platform
    /// has a notion of a per-user config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "drivefs").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist; the default path is skipped silently
    /// when missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Loading config file");
            figment = Self::merge_file(figment, file)?;
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from a single file on top of the defaults, ignoring
    /// the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::extract(Self::merge_file(Figment::from(Serialized::defaults(Config::default())), path)?)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|e| ErrorKind::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.drive.page_size == 0 || self.drive.page_size > MAX_PAGE_SIZE {
            exn::bail!(ErrorKind::Invalid("drive.page_size must be between 1 and 1000"));
        }
        if self.drive.api_url.is_empty() {
            exn::bail!(ErrorKind::Invalid("drive.api_url must not be empty"));
        }
        if self.drive.upload_url.is_empty() {
            exn::bail!(ErrorKind::Invalid("drive.upload_url must not be empty"));
        }
        if self.driver.conduit_capacity == 0 {
            exn::bail!(ErrorKind::Invalid("driver.conduit_capacity must be non-zero"));
        }
        Ok(())
    }
}
