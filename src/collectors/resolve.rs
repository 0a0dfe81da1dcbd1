//! Turning resolver output into fan-out targets.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{Resolution, ResourceKind, Vars};
use crate::identifiers::{IdKind, IdentifierSet};

/// Resolver output that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable output: {0}")]
pub struct ResolveError(String);

impl ResolveError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// One item a fan-out task runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Stable key, used in result labels and for deduplication.
    pub key: String,
    /// Template variables the target contributes.
    pub vars: Vars,
    /// Container restarts; only meaningful for pod containers.
    pub restart_count: u32,
}

impl Target {
    /// Target identified by a single `{id}`.
    pub fn id(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut vars = Vars::new();
        vars.insert("id".to_string(), id.clone());
        Self {
            key: id,
            vars,
            restart_count: 0,
        }
    }

    /// Target for one container of a pod.
    pub fn container(pod: &str, container: &str, restart_count: u32) -> Self {
        let mut vars = Vars::new();
        vars.insert("pod".to_string(), pod.to_string());
        vars.insert("container".to_string(), container.to_string());
        Self {
            key: format!("{}/{}", pod, container),
            vars,
            restart_count,
        }
    }
}

const SECURITY_GROUP_KEYS: [&str; 4] = [
    "Security Groups",
    "security_group_ids",
    "Security Group",
    "security_groups",
];

/// Targets per resource kind.
pub type Resolved = BTreeMap<ResourceKind, Vec<Target>>;

/// Parse a resolver's stdout into targets for every kind it produces.
pub fn resolve(
    resolution: Resolution,
    stdout: &str,
    ids: &IdentifierSet,
) -> Result<Resolved, ResolveError> {
    let mut resolved: Resolved = resolution
        .produces()
        .iter()
        .map(|kind| (*kind, Vec::new()))
        .collect();

    if stdout.trim().is_empty() {
        return Ok(resolved);
    }
    let value: Value =
        serde_json::from_str(stdout).map_err(|e| ResolveError::new(e.to_string()))?;

    match resolution {
        Resolution::Server => {
            let server = value
                .as_object()
                .ok_or_else(|| ResolveError::new("expected a JSON object"))?;
            if let Some(image) = server.get("image").and_then(extract_id) {
                push_unique(resolved.entry(ResourceKind::Image).or_default(), Target::id(image));
            }
            if let Some(flavor) = server.get("flavor").and_then(extract_id) {
                push_unique(resolved.entry(ResourceKind::Flavor).or_default(), Target::id(flavor));
            }
        }
        Resolution::VolumeAttachments => {
            for row in rows(&value)? {
                let id = field_str(row, &["Volume ID", "volume_id", "volumeId", "ID", "id"]);
                if let Some(id) = id {
                    push_unique(resolved.entry(ResourceKind::Volume).or_default(), Target::id(id));
                }
            }
        }
        Resolution::Ports => {
            for row in rows(&value)? {
                if let Some(id) = field_str(row, &["ID", "id"]) {
                    push_unique(resolved.entry(ResourceKind::Port).or_default(), Target::id(id));
                }
                if let Some(id) = field_str(row, &["Network ID", "network_id"]) {
                    push_unique(resolved.entry(ResourceKind::Network).or_default(), Target::id(id));
                }
                let groups = SECURITY_GROUP_KEYS
                    .iter()
                    .find_map(|key| row.get(*key))
                    .map(string_list)
                    .unwrap_or_default();
                for id in groups {
                    push_unique(
                        resolved.entry(ResourceKind::SecurityGroup).or_default(),
                        Target::id(id),
                    );
                }
            }
        }
        Resolution::StackResources => {
            for row in rows(&value)? {
                if let Some(name) = field_str(row, &["resource_name", "Resource Name"]) {
                    push_unique(
                        resolved.entry(ResourceKind::StackResource).or_default(),
                        Target::id(name),
                    );
                }
            }
        }
        Resolution::Pods => {
            let items = value
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| ResolveError::new("expected a pod list with items"))?;
            let filter = pod_components(ids);
            for pod in items {
                resolve_pod(pod, &filter, &mut resolved);
            }
        }
    }

    Ok(resolved)
}

/// Component names whose pods are relevant to the supplied identifiers.
///
/// Empty means every pod in the namespace.
pub fn pod_components(ids: &IdentifierSet) -> Vec<&'static str> {
    let mut components = Vec::new();
    let mut add = |names: &[&'static str]| {
        for name in names {
            if !components.contains(name) {
                components.push(*name);
            }
        }
    };

    if ids.has(IdKind::Vm) {
        add(&["nova", "glance", "image", "keystone", "neutron", "cinder"]);
    }
    if ids.has(IdKind::Port) || ids.has(IdKind::Network) {
        add(&["neutron"]);
    }
    if ids.has(IdKind::Volume) {
        add(&["cinder"]);
    }
    if ids.has(IdKind::Stack) {
        add(&["heat"]);
    }
    if ids.has(IdKind::User) {
        add(&["keystone"]);
    }
    components
}

fn resolve_pod(pod: &Value, filter: &[&str], resolved: &mut Resolved) {
    let Some(name) = pod.pointer("/metadata/name").and_then(Value::as_str) else {
        return;
    };
    let lowered = name.to_lowercase();
    if !filter.is_empty() && !filter.iter().any(|c| lowered.contains(c)) {
        return;
    }

    let restarts: BTreeMap<&str, u32> = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|status| {
                    let container = status.get("name")?.as_str()?;
                    let count = status.get("restartCount")?.as_u64()?;
                    Some((container, u32::try_from(count).unwrap_or(u32::MAX)))
                })
                .collect()
        })
        .unwrap_or_default();

    push_unique(resolved.entry(ResourceKind::Pod).or_default(), Target::id(name));

    let containers = pod
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for container in containers {
        if let Some(container) = container.get("name").and_then(Value::as_str) {
            let count = restarts.get(container).copied().unwrap_or(0);
            push_unique(
                resolved.entry(ResourceKind::PodContainer).or_default(),
                Target::container(name, container, count),
            );
        }
    }
}

fn rows(value: &Value) -> Result<&[Value], ResolveError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ResolveError::new("expected a JSON list"))
}

fn push_unique(targets: &mut Vec<Target>, target: Target) {
    if !targets.iter().any(|existing| existing.key == target.key) {
        targets.push(target);
    }
}

fn field_str(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| row.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Id of an image or flavor as shown by the server.
///
/// Objects carry an `id` (or, for newer flavors, only `original_name`);
/// strings look like `cirros (8e1a...)`. Boot-from-volume servers show
/// `N/A (booted from volume)` or an empty string.
fn extract_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) => field_str(value, &["id", "original_name", "name"]),
        Value::String(raw) => id_from_display(raw),
        _ => None,
    }
}

fn id_from_display(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("N/A") {
        return None;
    }
    if let (Some(open), true) = (raw.rfind('('), raw.ends_with(')')) {
        let inner = &raw[open + 1..raw.len() - 1];
        if is_uuid(inner) {
            return Some(inner.to_string());
        }
    }
    Some(raw.to_string())
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// A list that may arrive as JSON or as the CLI's stringified form.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(raw) => {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
                return items;
            }
            raw.trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split([',', '\n'])
                .map(|s| s.trim().trim_matches(|c: char| c == '\'' || c == '"').trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_ID: &str = "8e1a0b4c-1f0e-4a6b-9d1c-2f3e4a5b6c7d";

    fn keys(resolved: &Resolved, kind: ResourceKind) -> Vec<&str> {
        resolved[&kind].iter().map(|t| t.key.as_str()).collect()
    }

    #[test]
    fn test_server_image_and_flavor() {
        let stdout = format!(
            r#"{{"id": "vm-1", "image": "cirros-0.6 ({})", "flavor": {{"original_name": "m1.small", "vcpus": 1}}}}"#,
            IMAGE_ID
        );

        let resolved = resolve(Resolution::Server, &stdout, &IdentifierSet::default()).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Image), vec![IMAGE_ID]);
        assert_eq!(keys(&resolved, ResourceKind::Flavor), vec!["m1.small"]);
    }

    #[test]
    fn test_boot_from_volume_has_no_image() {
        let stdout = r#"{"image": "N/A (booted from volume)", "flavor": "m1.large (f1)"}"#;

        let resolved = resolve(Resolution::Server, stdout, &IdentifierSet::default()).unwrap();

        assert!(resolved[&ResourceKind::Image].is_empty());
        assert_eq!(keys(&resolved, ResourceKind::Flavor), vec!["m1.large (f1)"]);
    }

    #[test]
    fn test_volume_attachments() {
        let stdout = r#"[
            {"ID": "att-1", "Device": "/dev/vdb", "Server ID": "vm-1", "Volume ID": "vol-1"},
            {"ID": "att-2", "Device": "/dev/vdc", "Server ID": "vm-1", "Volume ID": "vol-2"},
            {"ID": "att-3", "Device": "/dev/vdd", "Server ID": "vm-1", "Volume ID": "vol-1"}
        ]"#;

        let resolved =
            resolve(Resolution::VolumeAttachments, stdout, &IdentifierSet::default()).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Volume), vec!["vol-1", "vol-2"]);
    }

    #[test]
    fn test_ports_with_networks_and_security_groups() {
        let stdout = r#"[
            {"ID": "p1", "Network ID": "net-a", "Security Groups": ["sg-1", "sg-2"]},
            {"ID": "p2", "Network ID": "net-a", "Security Groups": "['sg-2', 'sg-3']"},
            {"ID": "p3", "network_id": "net-b", "security_group_ids": "[\"sg-4\"]"}
        ]"#;

        let resolved = resolve(Resolution::Ports, stdout, &IdentifierSet::default()).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Port), vec!["p1", "p2", "p3"]);
        assert_eq!(keys(&resolved, ResourceKind::Network), vec!["net-a", "net-b"]);
        assert_eq!(
            keys(&resolved, ResourceKind::SecurityGroup),
            vec!["sg-1", "sg-2", "sg-3", "sg-4"]
        );
    }

    #[test]
    fn test_stack_resources() {
        let stdout = r#"[{"resource_name": "server", "resource_type": "OS::Nova::Server"},
                         {"resource_name": "port", "resource_type": "OS::Neutron::Port"}]"#;

        let resolved =
            resolve(Resolution::StackResources, stdout, &IdentifierSet::default()).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::StackResource), vec!["server", "port"]);
    }

    #[test]
    fn test_pods_filtered_by_components_with_restarts() {
        let stdout = r#"{"items": [
            {"metadata": {"name": "cinder-api-0"},
             "spec": {"containers": [{"name": "api"}, {"name": "httpd"}]},
             "status": {"containerStatuses": [{"name": "api", "restartCount": 2},
                                              {"name": "httpd", "restartCount": 0}]}},
            {"metadata": {"name": "heat-engine-1"},
             "spec": {"containers": [{"name": "engine"}]}}
        ]}"#;
        let ids = IdentifierSet {
            volume: Some("vol-1".to_string()),
            namespace: Some("openstack".to_string()),
            ..Default::default()
        };

        let resolved = resolve(Resolution::Pods, stdout, &ids).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Pod), vec!["cinder-api-0"]);
        let containers = &resolved[&ResourceKind::PodContainer];
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].key, "cinder-api-0/api");
        assert_eq!(containers[0].restart_count, 2);
        assert_eq!(containers[1].restart_count, 0);
        assert_eq!(containers[1].vars["container"], "httpd");
    }

    #[test]
    fn test_pods_without_resource_ids_are_namespace_wide() {
        let stdout = r#"{"items": [
            {"metadata": {"name": "nova-api-0"}, "spec": {"containers": [{"name": "api"}]}},
            {"metadata": {"name": "rabbitmq-0"}, "spec": {"containers": [{"name": "rabbitmq"}]}}
        ]}"#;
        let ids = IdentifierSet {
            namespace: Some("openstack".to_string()),
            ..Default::default()
        };

        let resolved = resolve(Resolution::Pods, stdout, &ids).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Pod), vec!["nova-api-0", "rabbitmq-0"]);
    }

    #[test]
    fn test_vm_selects_image_service_pods() {
        let stdout = r#"{"items": [
            {"metadata": {"name": "image-registry-0"}, "spec": {"containers": [{"name": "registry"}]}},
            {"metadata": {"name": "heat-engine-0"}, "spec": {"containers": [{"name": "engine"}]}}
        ]}"#;
        let ids = IdentifierSet {
            vm: Some("vm-1".to_string()),
            namespace: Some("openstack".to_string()),
            ..Default::default()
        };

        let resolved = resolve(Resolution::Pods, stdout, &ids).unwrap();

        assert_eq!(keys(&resolved, ResourceKind::Pod), vec!["image-registry-0"]);
    }

    #[test]
    fn test_empty_output_resolves_nothing() {
        let resolved = resolve(Resolution::Ports, "  \n", &IdentifierSet::default()).unwrap();

        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(Vec::is_empty));
    }

    #[test]
    fn test_unparseable_output() {
        let err = resolve(Resolution::Ports, "+----+\n| ID |", &IdentifierSet::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("unparseable output"));

        assert!(resolve(Resolution::Server, "[]", &IdentifierSet::default()).is_err());
        assert!(resolve(Resolution::Pods, "[]", &IdentifierSet::default()).is_err());
    }

    #[test]
    fn test_pod_components() {
        let ids = IdentifierSet {
            vm: Some("vm-1".to_string()),
            user: Some("alice".to_string()),
            network: Some("net-1".to_string()),
            ..Default::default()
        };

        assert_eq!(
            pod_components(&ids),
            vec!["nova", "glance", "image", "keystone", "neutron", "cinder"]
        );
        assert!(pod_components(&IdentifierSet::default()).is_empty());
    }
}
