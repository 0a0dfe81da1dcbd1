//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use osdebug::runner::{CommandRunner, CommandSpec, RunOutcome, RunnerError};
use osdebug::Settings;

/// How the fake backend answers a command.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail(i32, String),
    Timeout,
    Missing,
}

/// Backend fake answering by command-line prefix (longest match wins).
///
/// Unmatched commands succeed with a short generic body.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    replies: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: &str, reply: Reply) -> Self {
        self.replies.push((prefix.to_string(), reply));
        self
    }

    pub fn ok(self, prefix: &str, stdout: &str) -> Self {
        self.on(prefix, Reply::Ok(stdout.to_string()))
    }

    pub fn fail(self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.on(prefix, Reply::Fail(code, stderr.to_string()))
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every command line seen so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, RunnerError> {
        let line = command.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let reply = self
            .replies
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Ok(format!("output of {}\n", line)));

        match reply {
            Reply::Ok(stdout) => Ok(RunOutcome::ok(stdout)),
            Reply::Fail(code, stderr) => Ok(RunOutcome::failed(code, stderr)),
            Reply::Timeout => Err(RunnerError::Timeout(
                timeout.unwrap_or(Duration::from_secs(120)),
            )),
            Reply::Missing => Err(RunnerError::Spawn {
                program: command.backend.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No such file or directory",
                ),
            }),
        }
    }
}

/// Environment with a complete openrc.
pub fn openrc_env() -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    let vars: HashMap<&'static str, &'static str> = [
        ("OS_AUTH_URL", "https://keystone.example:5000/v3"),
        ("OS_USERNAME", "admin"),
        ("OS_PROJECT_NAME", "admin"),
    ]
    .into_iter()
    .collect();
    move |key| vars.get(key).map(|v| v.to_string())
}

/// Empty environment.
pub fn empty_env() -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    |_| None
}

/// Default settings with a kubeconfig that exists.
pub fn settings_with_kubeconfig(dir: &std::path::Path) -> Settings {
    let kubeconfig = dir.join("kubeconfig");
    std::fs::write(&kubeconfig, "apiVersion: v1\nkind: Config\n").unwrap();
    let mut settings = Settings::default();
    settings.backends.kubeconfig = Some(kubeconfig);
    settings
}

pub const SERVER_JSON: &str = r#"{
  "id": "vm-1",
  "name": "web-0",
  "status": "ACTIVE",
  "image": {"id": "img-1"},
  "flavor": {"original_name": "m1.small"}
}"#;

pub const PORTS_JSON: &str = r#"[
  {"ID": "port-1", "Network ID": "net-1", "Security Groups": ["sg-1", "sg-2"]},
  {"ID": "port-2", "Network ID": "net-1", "Security Groups": ["sg-1"]}
]"#;

pub const VOLUMES_JSON: &str = r#"[
  {"ID": "att-1", "Volume ID": "vol-1", "Device": "/dev/vdb"}
]"#;

/// Two pods: nova-api restarted twice, keystone never.
pub const PODS_JSON: &str = r#"{
  "items": [
    {
      "metadata": {"name": "nova-api-0"},
      "spec": {"containers": [{"name": "nova-api"}]},
      "status": {"containerStatuses": [{"name": "nova-api", "restartCount": 2}]}
    },
    {
      "metadata": {"name": "keystone-api-0"},
      "spec": {"containers": [{"name": "keystone-api"}]},
      "status": {"containerStatuses": [{"name": "keystone-api", "restartCount": 0}]}
    }
  ]
}"#;

pub const STACK_RESOURCES_JSON: &str = r#"[
  {"resource_name": "server", "resource_type": "OS::Nova::Server", "resource_status": "CREATE_COMPLETE"},
  {"resource_name": "port", "resource_type": "OS::Neutron::Port", "resource_status": "CREATE_FAILED"}
]"#;

/// A healthy cloud around server `vm-1`, stack `stack-1` and two control-plane pods.
pub fn cloud() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok("openstack server show vm-1 -f json", SERVER_JSON)
        .ok("openstack server volume list", VOLUMES_JSON)
        .ok("openstack port list", PORTS_JSON)
        .ok("openstack stack resource list", STACK_RESOURCES_JSON)
        .ok("kubectl get pods", PODS_JSON)
}
