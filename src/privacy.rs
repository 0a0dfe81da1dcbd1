//! Redaction of sensitive values in collected artifacts.
//!
//! Bundles are often handed to a vendor or attached to a ticket. When
//! redaction is enabled every artifact passes through a [`Redactor`] before
//! it is written.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Controls what is scrubbed from artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    /// Master switch; nothing is redacted when false.
    pub enabled: bool,
    /// Redact IPv4 addresses.
    pub ips: bool,
    /// Redact MAC addresses.
    pub macs: bool,
    /// Redact Fernet auth tokens.
    pub tokens: bool,
    /// Additional patterns to redact (as regex strings).
    pub patterns: Vec<String>,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ips: true,
            macs: true,
            tokens: true,
            patterns: Vec::new(),
        }
    }
}

impl RedactionSettings {
    /// Check that every custom pattern compiles.
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.patterns {
            Regex::new(pattern).map_err(|e| {
                Error::ConfigError(format!("invalid redaction pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Applies [`RedactionSettings`] to artifact text.
#[derive(Debug, Clone)]
pub struct Redactor {
    settings: RedactionSettings,
    ip_regex: Regex,
    mac_regex: Regex,
    token_regex: Regex,
    custom: Vec<Regex>,
}

impl Redactor {
    /// Compile a redactor for the given settings.
    pub fn new(settings: RedactionSettings) -> Result<Self> {
        let ip_regex = compile(
            r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
        )?;
        let mac_regex = compile(r"\b(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}\b")?;
        let token_regex = compile(r"\bgAAAAA[A-Za-z0-9_\-=]{20,}")?;

        let custom = settings
            .patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            settings,
            ip_regex,
            mac_regex,
            token_regex,
            custom,
        })
    }

    /// Whether this redactor changes anything at all.
    pub fn is_active(&self) -> bool {
        self.settings.enabled
    }

    /// Redact sensitive information from a string based on the settings.
    pub fn redact(&self, input: &str) -> String {
        if !self.settings.enabled {
            return input.to_string();
        }

        let mut result = input.to_string();

        if self.settings.tokens {
            result = self
                .token_regex
                .replace_all(&result, "[REDACTED_TOKEN]")
                .to_string();
        }

        if self.settings.ips {
            result = self.ip_regex.replace_all(&result, "[REDACTED_IP]").to_string();
        }

        if self.settings.macs {
            result = self
                .mac_regex
                .replace_all(&result, "[REDACTED_MAC]")
                .to_string();
        }

        for re in &self.custom {
            result = re.replace_all(&result, "[REDACTED]").to_string();
        }

        result
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::ConfigError(format!("invalid redaction pattern '{}': {}", pattern, e)))
}
