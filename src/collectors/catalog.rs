//! The fixed, ordered task catalog.
//!
//! Order: health checks, the VM and its associations, stack, user, then the
//! orchestration layer. Each fan-out appears after the resolver that feeds it.

use super::{Needs, Resolution, ResourceKind, TaskKind, TaskSpec};
use crate::artifact::Category;
use crate::identifiers::IdKind;
use crate::runner::Backend;

const VM: Needs = Needs::AnyOf(&[IdKind::Vm]);
const VM_OR_VOLUME: Needs = Needs::AnyOf(&[IdKind::Vm, IdKind::Volume]);
const VM_OR_PORT: Needs = Needs::AnyOf(&[IdKind::Vm, IdKind::Port]);
const VM_OR_NETWORK: Needs = Needs::AnyOf(&[IdKind::Vm, IdKind::Network]);
const STACK: Needs = Needs::AnyOf(&[IdKind::Stack]);
const USER: Needs = Needs::AnyOf(&[IdKind::User]);
const NAMESPACE: Needs = Needs::AnyOf(&[IdKind::Namespace]);

const fn health(name: &'static str, args: &'static [&'static str], file: &'static str) -> TaskSpec {
    TaskSpec {
        name,
        category: Category::Health,
        backend: Backend::OpenStack,
        args,
        file,
        needs: Needs::Nothing,
        kind: TaskKind::Single,
    }
}

const fn openstack(
    name: &'static str,
    category: Category,
    args: &'static [&'static str],
    file: &'static str,
    needs: Needs,
    kind: TaskKind,
) -> TaskSpec {
    TaskSpec {
        name,
        category,
        backend: Backend::OpenStack,
        args,
        file,
        needs,
        kind,
    }
}

const fn kubectl(
    name: &'static str,
    category: Category,
    args: &'static [&'static str],
    file: &'static str,
    kind: TaskKind,
) -> TaskSpec {
    TaskSpec {
        name,
        category,
        backend: Backend::Kubectl,
        args,
        file,
        needs: NAMESPACE,
        kind,
    }
}

const fn fan_out(over: ResourceKind, explicit: Option<IdKind>) -> TaskKind {
    TaskKind::FanOut { over, explicit }
}

/// Every collector, in execution order.
pub static CATALOG: &[TaskSpec] = &[
    // Service health
    health("compute_services", &["compute", "service", "list"], "compute_services.txt"),
    health("network_agents", &["network", "agent", "list"], "network_agents.txt"),
    health("volume_services", &["volume", "service", "list"], "volume_services.txt"),
    health("resource_providers", &["resource", "provider", "list"], "resource_providers.txt"),
    health("hypervisors", &["hypervisor", "list", "--long"], "hypervisors.txt"),
    // VM
    openstack(
        "server_show",
        Category::Nova,
        &["server", "show", "{vm}", "--fit-width", "--max-width", "500"],
        "server_show.txt",
        VM,
        TaskKind::Single,
    ),
    openstack(
        "server",
        Category::Nova,
        &["server", "show", "{vm}", "-f", "json"],
        "server.json",
        VM,
        TaskKind::Resolve(Resolution::Server),
    ),
    openstack(
        "server_events",
        Category::Nova,
        &["server", "event", "list", "{vm}"],
        "server_events.txt",
        VM,
        TaskKind::Single,
    ),
    openstack(
        "migrations",
        Category::Nova,
        &["server", "migration", "list", "--server", "{vm}"],
        "migrations.txt",
        VM,
        TaskKind::Single,
    ),
    openstack(
        "attached_volumes",
        Category::Cinder,
        &["server", "volume", "list", "{vm}", "-f", "json"],
        "attached_volumes.json",
        VM,
        TaskKind::Resolve(Resolution::VolumeAttachments),
    ),
    openstack(
        "volume_show",
        Category::Cinder,
        &["volume", "show", "{id}"],
        "volume_{id}.txt",
        VM_OR_VOLUME,
        fan_out(ResourceKind::Volume, Some(IdKind::Volume)),
    ),
    openstack(
        "vm_ports",
        Category::Neutron,
        &["port", "list", "--device-id", "{vm}", "--long", "-f", "json"],
        "vm_ports.json",
        VM,
        TaskKind::Resolve(Resolution::Ports),
    ),
    openstack(
        "port_show",
        Category::Neutron,
        &["port", "show", "{id}"],
        "port_{id}.txt",
        VM_OR_PORT,
        fan_out(ResourceKind::Port, Some(IdKind::Port)),
    ),
    openstack(
        "network_show",
        Category::Neutron,
        &["network", "show", "{id}"],
        "network_{id}.txt",
        VM_OR_NETWORK,
        fan_out(ResourceKind::Network, Some(IdKind::Network)),
    ),
    openstack(
        "security_group_show",
        Category::Neutron,
        &["security", "group", "show", "{id}"],
        "security_group_{id}.txt",
        VM,
        fan_out(ResourceKind::SecurityGroup, None),
    ),
    openstack(
        "security_group_rules",
        Category::Neutron,
        &["security", "group", "rule", "list", "{id}"],
        "security_group_{id}_rules.txt",
        VM,
        fan_out(ResourceKind::SecurityGroup, None),
    ),
    openstack(
        "image_show",
        Category::Glance,
        &["image", "show", "{id}"],
        "image_{id}.txt",
        VM,
        fan_out(ResourceKind::Image, None),
    ),
    openstack(
        "flavor_show",
        Category::Nova,
        &["flavor", "show", "{id}"],
        "flavor_{id}.txt",
        VM,
        fan_out(ResourceKind::Flavor, None),
    ),
    // Stack
    openstack(
        "stack_show",
        Category::Heat,
        &["stack", "show", "{stack}"],
        "stack_show.txt",
        STACK,
        TaskKind::Single,
    ),
    openstack(
        "stack_resources",
        Category::Heat,
        &["stack", "resource", "list", "{stack}", "-f", "json"],
        "stack_resources.json",
        STACK,
        TaskKind::Resolve(Resolution::StackResources),
    ),
    openstack(
        "stack_resource_show",
        Category::Heat,
        &["stack", "resource", "show", "{stack}", "{id}"],
        "resource_{id}.txt",
        STACK,
        fan_out(ResourceKind::StackResource, None),
    ),
    openstack(
        "stack_events",
        Category::Heat,
        &["stack", "event", "list", "{stack}"],
        "stack_events.txt",
        STACK,
        TaskKind::Single,
    ),
    // User
    openstack(
        "user_show",
        Category::Keystone,
        &["user", "show", "{user}"],
        "user_show.txt",
        USER,
        TaskKind::Single,
    ),
    openstack(
        "user_role_assignments",
        Category::Keystone,
        &["role", "assignment", "list", "--user", "{user}", "--names"],
        "user_role_assignments.txt",
        USER,
        TaskKind::Single,
    ),
    // Orchestration layer
    kubectl(
        "namespace_events",
        Category::Events,
        &["get", "events", "-n", "{namespace}", "--sort-by=.lastTimestamp"],
        "{namespace}_events.txt",
        TaskKind::Single,
    ),
    kubectl(
        "pods",
        Category::Describe,
        &["get", "pods", "-n", "{namespace}", "-o", "json"],
        "pods.json",
        TaskKind::Resolve(Resolution::Pods),
    ),
    kubectl(
        "pod_describe",
        Category::Describe,
        &["describe", "pod", "{id}", "-n", "{namespace}"],
        "{id}.txt",
        fan_out(ResourceKind::Pod, None),
    ),
    kubectl(
        "pod_logs",
        Category::Logs,
        &["logs", "{pod}", "-n", "{namespace}", "-c", "{container}"],
        "{pod}_{container}.log",
        TaskKind::ContainerLogs,
    ),
];
