//! Configuration loading.
//!
//! Settings come from an optional TOML file. A missing user config falls
//! back to defaults; an explicitly requested file must exist.
//!
//! ```toml
//! command_timeout_secs = 60
//! archive = true
//!
//! [backends]
//! openstack = "/opt/osc/bin/openstack"
//! kubeconfig = "/etc/kubernetes/admin.conf"
//!
//! [redaction]
//! enabled = true
//! patterns = ["tenant-[0-9]+"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::privacy::RedactionSettings;

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Backend programs and where they find their credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Infrastructure CLI program.
    pub openstack: String,
    /// Orchestration-layer CLI program.
    pub kubectl: String,
    /// Kubeconfig passed to the orchestration-layer CLI.
    pub kubeconfig: Option<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            openstack: "openstack".to_string(),
            kubectl: "kubectl".to_string(),
            kubeconfig: None,
        }
    }
}

/// Settings for a collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backends: BackendSettings,
    /// Per-command timeout; 0 disables it.
    pub command_timeout_secs: u64,
    /// Prefix of the timestamped bundle directory.
    pub output_prefix: String,
    /// Archive the bundle after the summary is written.
    pub archive: bool,
    /// Variables that must be set unless `OS_CLOUD` selects a clouds.yaml entry.
    pub required_env: Vec<String>,
    pub redaction: RedactionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backends: BackendSettings::default(),
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
            output_prefix: "debug-output".to_string(),
            archive: false,
            required_env: vec![
                "OS_AUTH_URL".to_string(),
                "OS_USERNAME".to_string(),
                "OS_PROJECT_NAME".to_string(),
            ],
            redaction: RedactionSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Per-command timeout, if any.
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Check settings for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.backends.openstack.trim().is_empty() {
            return Err(Error::ConfigError(
                "backends.openstack must not be empty".to_string(),
            ));
        }
        if self.backends.kubectl.trim().is_empty() {
            return Err(Error::ConfigError(
                "backends.kubectl must not be empty".to_string(),
            ));
        }
        if self.output_prefix.trim().is_empty() || self.output_prefix.contains('/') {
            return Err(Error::ConfigError(format!(
                "invalid output_prefix: '{}'",
                self.output_prefix
            )));
        }
        self.redaction.validate()
    }
}

/// Loads [`Settings`] from a file.
pub struct SettingsLoader {
    path: PathBuf,
    use_defaults: bool,
}

impl SettingsLoader {
    /// Create a loader for an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_defaults: false,
        }
    }

    /// Create a loader for the per-user config file, falling back to defaults.
    pub fn user() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osdebug")
            .join("config.toml");
        Self {
            path,
            use_defaults: true,
        }
    }

    /// Set whether a missing file yields defaults instead of an error.
    pub fn use_defaults(mut self, use_defaults: bool) -> Self {
        self.use_defaults = use_defaults;
        self
    }

    /// Path this loader reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            if self.use_defaults {
                tracing::debug!(path = %self.path.display(), "no config file, using defaults");
                return Ok(Settings::default());
            }
            return Err(Error::ConfigError(format!(
                "config file not found: {}",
                self.path.display()
            )));
        }

        let text = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Settings::from_toml(&text).map_err(|e| match e {
            Error::ConfigError(reason) => {
                Error::ConfigError(format!("{}: {}", self.path.display(), reason))
            }
            other => other,
        })
    }
}
