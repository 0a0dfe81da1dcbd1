//! Diagnostic collectors, described as data.
//!
//! Every collector is a [`TaskSpec`]: a category, a requirement on the
//! identifier set, a backend command template and an artifact name. The
//! [`engine`](crate::engine) walks the fixed [`CATALOG`] in order and is
//! the only place that executes anything.

pub mod catalog;
pub mod resolve;

pub use catalog::CATALOG;
pub use resolve::{ResolveError, Target};

use std::collections::BTreeMap;
use std::fmt;

use crate::artifact::Category;
use crate::identifiers::{IdKind, IdentifierSet, Mode};
use crate::runner::Backend;

/// Requirement a task places on the identifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needs {
    /// Global task; always runs.
    Nothing,
    /// Runs iff at least one of these identifiers was supplied.
    AnyOf(&'static [IdKind]),
}

impl Needs {
    pub fn satisfied_by(&self, ids: &IdentifierSet) -> bool {
        match self {
            Needs::Nothing => true,
            Needs::AnyOf(kinds) => kinds.iter().any(|kind| ids.has(*kind)),
        }
    }
}

/// Resource ids a resolver step can produce for later tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Image,
    Flavor,
    Volume,
    Port,
    Network,
    SecurityGroup,
    StackResource,
    Pod,
    PodContainer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Image => "image",
            ResourceKind::Flavor => "flavor",
            ResourceKind::Volume => "volume",
            ResourceKind::Port => "port",
            ResourceKind::Network => "network",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::StackResource => "stack resource",
            ResourceKind::Pod => "pod",
            ResourceKind::PodContainer => "pod container",
        };
        f.pad(name)
    }
}

/// How a resolver's output is turned into ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Server JSON: image and flavor.
    Server,
    /// Server volume attachments.
    VolumeAttachments,
    /// Ports bound to the server, with their networks and security groups.
    Ports,
    /// Resources of a stack.
    StackResources,
    /// Pods of a namespace and their containers.
    Pods,
}

impl Resolution {
    /// Resource kinds this resolution yields.
    pub fn produces(&self) -> &'static [ResourceKind] {
        match self {
            Resolution::Server => &[ResourceKind::Image, ResourceKind::Flavor],
            Resolution::VolumeAttachments => &[ResourceKind::Volume],
            Resolution::Ports => &[
                ResourceKind::Port,
                ResourceKind::Network,
                ResourceKind::SecurityGroup,
            ],
            Resolution::StackResources => &[ResourceKind::StackResource],
            Resolution::Pods => &[ResourceKind::Pod, ResourceKind::PodContainer],
        }
    }
}

/// Shape of a task's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// One command, one artifact.
    Single,
    /// One command whose output also feeds later fan-out tasks.
    Resolve(Resolution),
    /// One command per target: the explicit identifier (if any) unioned with resolved ids.
    FanOut {
        over: ResourceKind,
        explicit: Option<IdKind>,
    },
    /// Current log per container, plus the previous incarnation's log after a restart.
    ContainerLogs,
}

/// A collector, as data.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub name: &'static str,
    pub category: Category,
    pub backend: Backend,
    /// Argument templates; `{key}` is substituted from identifiers and targets.
    pub args: &'static [&'static str],
    /// Artifact file name template.
    pub file: &'static str,
    pub needs: Needs,
    pub kind: TaskKind,
}

impl TaskSpec {
    /// Whether the backend this task uses exists in the given mode.
    pub fn available_in(&self, mode: Mode) -> bool {
        self.backend != Backend::Kubectl || mode.has_orchestration_backend()
    }

    pub fn is_applicable(&self, ids: &IdentifierSet) -> bool {
        self.needs.satisfied_by(ids)
    }

    /// `category/name` label.
    pub fn label(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }
}

/// A catalog entry selected for a run.
#[derive(Debug, Clone, Copy)]
pub struct PlannedTask {
    pub spec: &'static TaskSpec,
    pub applicable: bool,
}

/// Tasks for a run, in execution order.
///
/// Tasks whose backend is absent in `mode` are left out entirely; the rest
/// are kept and flagged with whether their identifiers were supplied.
pub fn plan(mode: Mode, ids: &IdentifierSet) -> Vec<PlannedTask> {
    CATALOG
        .iter()
        .filter(|spec| spec.available_in(mode))
        .map(|spec| PlannedTask {
            spec,
            applicable: spec.is_applicable(ids),
        })
        .collect()
}

/// Values substituted into templates.
pub type Vars = BTreeMap<String, String>;

/// Template variables provided by the identifier set.
pub fn identifier_vars(ids: &IdentifierSet) -> Vars {
    ids.supplied()
        .into_iter()
        .map(|(kind, value)| (kind.as_str().to_string(), value.to_string()))
        .collect()
}

/// Substitute `{key}` placeholders. `None` if a key has no value.
pub fn render(template: &str, vars: &Vars) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}')?;
        out.push_str(vars.get(&after[..end])?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}
