//! Identifiers supplied for a run and the deployment mode they apply to.

use std::fmt;

use crate::error::{Error, Result};

/// Kind of identifier an operator can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKind {
    Vm,
    Stack,
    User,
    Volume,
    Port,
    Network,
    Namespace,
}

impl IdKind {
    /// All identifier kinds, in display order.
    pub const ALL: [IdKind; 7] = [
        IdKind::Vm,
        IdKind::Stack,
        IdKind::User,
        IdKind::Volume,
        IdKind::Port,
        IdKind::Network,
        IdKind::Namespace,
    ];

    /// Name used in command templates and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Vm => "vm",
            IdKind::Stack => "stack",
            IdKind::User => "user",
            IdKind::Volume => "volume",
            IdKind::Port => "port",
            IdKind::Network => "network",
            IdKind::Namespace => "namespace",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Deployment mode, i.e. which backends are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Infrastructure backend plus the orchestration layer hosting it.
    Full,
    /// Infrastructure backend only.
    Restricted,
}

impl Mode {
    /// Whether the orchestration-layer backend can be used.
    pub fn has_orchestration_backend(&self) -> bool {
        matches!(self, Mode::Full)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => f.pad("full"),
            Mode::Restricted => f.pad("restricted"),
        }
    }
}

/// The identifiers a run was started with. Never mutated once the run begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    pub vm: Option<String>,
    pub stack: Option<String>,
    pub user: Option<String>,
    pub volume: Option<String>,
    pub port: Option<String>,
    pub network: Option<String>,
    pub namespace: Option<String>,
}

impl IdentifierSet {
    /// Value for an identifier kind. Blank values count as absent.
    pub fn get(&self, kind: IdKind) -> Option<&str> {
        let value = match kind {
            IdKind::Vm => &self.vm,
            IdKind::Stack => &self.stack,
            IdKind::User => &self.user,
            IdKind::Volume => &self.volume,
            IdKind::Port => &self.port,
            IdKind::Network => &self.network,
            IdKind::Namespace => &self.namespace,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Whether an identifier of this kind was supplied.
    pub fn has(&self, kind: IdKind) -> bool {
        self.get(kind).is_some()
    }

    /// Supplied identifiers in display order.
    pub fn supplied(&self) -> Vec<(IdKind, &str)> {
        IdKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind).map(|value| (*kind, value)))
            .collect()
    }

    /// Whether any resource identifier (anything but the namespace) was supplied.
    pub fn has_resource_ids(&self) -> bool {
        IdKind::ALL
            .iter()
            .any(|kind| *kind != IdKind::Namespace && self.has(*kind))
    }

    /// Check that the target flag required by the mode is present.
    pub fn validate(&self, mode: Mode) -> Result<()> {
        match mode {
            Mode::Full if !self.has(IdKind::Namespace) => Err(Error::InvalidIdentifiers(
                "full mode requires a namespace".to_string(),
            )),
            Mode::Restricted if self.has(IdKind::Namespace) => Err(Error::InvalidIdentifiers(
                "a namespace needs the orchestration backend; use full mode".to_string(),
            )),
            Mode::Restricted if !self.has(IdKind::Vm) => Err(Error::InvalidIdentifiers(
                "restricted mode requires a VM id".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for IdentifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let supplied = self.supplied();
        if supplied.is_empty() {
            return f.pad("none");
        }
        let parts: Vec<String> = supplied
            .iter()
            .map(|(kind, value)| format!("{}={}", kind, value))
            .collect();
        f.pad(&parts.join(", "))
    }
}
