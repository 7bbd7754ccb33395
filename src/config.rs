use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SyncError, SyncOutcome};
use crate::logger::Logger;

/// Default GitHub REST endpoint
pub const DEFAULT_API_HOST: &str = "https://api.github.com";

/// Main configuration structure for repomirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory every repository and gist is mirrored into
    #[serde(default = "default_root")]
    pub root: String,

    /// GitHub account and API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Account whose items are mirrored
    pub user: Option<String>,

    /// Personal access token. Prefer GITHUB_TOKEN over storing it here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// API base URL
    #[serde(default = "default_api_host")]
    pub api_host: String,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SyncConfig {
    /// Log actions instead of running them
    #[serde(default)]
    pub dry_run: bool,

    /// Timeout for a single git command in seconds, 0 disables it
    #[serde(default)]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

fn default_root() -> String {
    "${HOME}/github".to_string()
}
fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            user: None,
            token: None,
            api_host: default_api_host(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            github: GitHubConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Self::expanded_default()
        }
    }

    /// Default configuration with its paths already expanded
    pub fn expanded_default() -> Result<Self> {
        let mut config = Self::default();
        config.expand_paths()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repomirror").join("config.yml"))
    }

    /// Expand environment variables and `~` in the sync root
    pub fn expand_paths(&mut self) -> Result<()> {
        self.root = shellexpand::full(&self.root)
            .context("Failed to expand root path")?
            .into_owned();

        Ok(())
    }

    /// Per-command timeout for git, if one is configured
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.sync.timeout > 0).then(|| Duration::from_secs(self.sync.timeout))
    }

    /// Merge CLI flags, environment and file values into unvalidated options.
    ///
    /// Precedence is flag, then `GITHUB_USER`/`GITHUB_TOKEN`, then the file.
    pub fn options(&self, user: Option<String>, auth: Option<String>, dry_run: bool) -> Options {
        Options {
            user: user
                .or_else(|| env::var("GITHUB_USER").ok())
                .or_else(|| self.github.user.clone()),
            auth_token: auth
                .or_else(|| env::var("GITHUB_TOKEN").ok())
                .or_else(|| self.github.token.clone()),
            dry_run: dry_run || self.sync.dry_run,
        }
    }
}

/// Run options as resolved from the outside world, not yet validated
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub user: Option<String>,
    pub auth_token: Option<String>,
    pub dry_run: bool,
}

/// Immutable per-run settings shared by every stage of a sync
#[derive(Clone)]
pub struct SyncContext {
    root: PathBuf,
    user: String,
    auth_token: String,
    dry_run: bool,
    logger: Arc<dyn Logger>,
}

impl SyncContext {
    /// Validate options once; empty strings count as missing.
    pub fn new(root: impl Into<PathBuf>, opts: Options, logger: Arc<dyn Logger>) -> SyncOutcome<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(SyncError::Config("root directory is empty".to_string()));
        }

        let user = require(opts.user, "user")?;
        let auth_token = require(opts.auth_token, "auth")?;

        Ok(Self {
            root,
            user,
            auth_token,
            dry_run: opts.dry_run,
            logger,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("root", &self.root)
            .field("user", &self.user)
            .field("auth_token", &"<redacted>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

fn require(value: Option<String>, field: &str) -> SyncOutcome<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SyncError::MissingOption {
            field: field.to_string(),
        }),
    }
}
