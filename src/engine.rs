//! The generic execution loop.
//!
//! Walks a plan in order, one backend command at a time. Every command ends as
//! exactly one recorded [`RunResult`], written once and never revisited; a
//! fan-out whose resolver failed also records that skip next to any explicit
//! targets it still ran. Nothing a task does can stop the loop.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::artifact::{ArtifactContent, ArtifactWriter, Category, WrittenArtifact};
use crate::collectors::resolve::{resolve, Resolved};
use crate::collectors::{
    identifier_vars, render, PlannedTask, Resolution, ResourceKind, Target, TaskKind, TaskSpec,
    Vars,
};
use crate::identifiers::{IdKind, IdentifierSet};
use crate::report::{RunResult, NO_IDENTIFIER};
use crate::runner::{CommandRunner, CommandSpec, RunOutcome, RunnerError};

/// What a resolver left behind for the fan-outs that depend on it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TargetState {
    Ready(Vec<Target>),
    Failed(String),
}

/// How a single command ended, before it is recorded.
enum Step {
    Collected {
        outcome: RunOutcome,
        artifact: WrittenArtifact,
    },
    Failed {
        reason: String,
        exit_code: Option<i32>,
    },
}

impl Step {
    fn failed(reason: impl Into<String>) -> Self {
        Step::Failed {
            reason: reason.into(),
            exit_code: None,
        }
    }

    fn into_result(self, category: Category, task: String) -> RunResult {
        match self {
            Step::Collected { artifact, .. } => {
                RunResult::success(category, task, artifact.relative, artifact.bytes)
            }
            Step::Failed { reason, exit_code } => {
                RunResult::failed(category, task, reason, exit_code)
            }
        }
    }
}

/// Executes planned tasks against a runner, writing artifacts as it goes.
pub struct Engine<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    writer: &'a ArtifactWriter,
    ids: &'a IdentifierSet,
    vars: Vars,
    timeout: Option<Duration>,
    resolved: BTreeMap<ResourceKind, TargetState>,
    results: Vec<RunResult>,
}

impl<'a, R: CommandRunner + ?Sized> Engine<'a, R> {
    pub fn new(
        runner: &'a R,
        writer: &'a ArtifactWriter,
        ids: &'a IdentifierSet,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            writer,
            ids,
            vars: identifier_vars(ids),
            timeout,
            resolved: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    /// Run every planned task in order and return the results in execution order.
    pub async fn execute(mut self, plan: &[PlannedTask]) -> Vec<RunResult> {
        for planned in plan {
            let spec = planned.spec;
            if !planned.applicable {
                debug!("Skipping {}: {}", spec.label(), NO_IDENTIFIER);
                self.results
                    .push(RunResult::skipped(spec.category, spec.name, NO_IDENTIFIER));
                continue;
            }

            match spec.kind {
                TaskKind::Single => {
                    let step = self.run_step(spec, spec.name, &self.vars, false).await;
                    self.record(spec, spec.name.to_string(), step);
                }
                TaskKind::Resolve(resolution) => self.resolve_task(spec, resolution).await,
                TaskKind::FanOut { over, explicit } => {
                    let targets = self.fan_out_targets(over, explicit);
                    self.run_targets(spec, over, targets).await;
                }
                TaskKind::ContainerLogs => {
                    let targets = self.fan_out_targets(ResourceKind::PodContainer, None);
                    self.run_targets(spec, ResourceKind::PodContainer, targets)
                        .await;
                }
            }
        }

        self.results
    }

    /// Run a resolver, parse its output, then record one result for it.
    async fn resolve_task(&mut self, spec: &TaskSpec, resolution: Resolution) {
        let step = self.run_step(spec, spec.name, &self.vars, false).await;

        let (step, parsed) = match step {
            Step::Collected { outcome, artifact } => {
                match resolve(resolution, &outcome.stdout, self.ids) {
                    Ok(resolved) => (Step::Collected { outcome, artifact }, Ok(resolved)),
                    Err(e) => {
                        let reason = e.to_string();
                        warn!("{} returned {}", spec.label(), reason);
                        (Step::failed(reason.clone()), Err(reason))
                    }
                }
            }
            Step::Failed { reason, exit_code } => {
                let detail = reason.clone();
                (Step::Failed { reason, exit_code }, Err(detail))
            }
        };

        self.record(spec, spec.name.to_string(), step);
        self.remember(spec, resolution, parsed);
    }

    fn remember(&mut self, spec: &TaskSpec, resolution: Resolution, parsed: Result<Resolved, String>) {
        match parsed {
            Ok(resolved) => {
                for (kind, targets) in resolved {
                    debug!("{} resolved {} {} target(s)", spec.name, targets.len(), kind);
                    self.resolved.insert(kind, TargetState::Ready(targets));
                }
            }
            Err(reason) => {
                let reason = format!("{} failed: {}", spec.name, reason);
                for kind in resolution.produces() {
                    self.resolved
                        .insert(*kind, TargetState::Failed(reason.clone()));
                }
            }
        }
    }

    /// Explicit identifier first, then resolved ids not already present.
    fn fan_out_targets(&self, over: ResourceKind, explicit: Option<IdKind>) -> Vec<Target> {
        let mut targets: Vec<Target> = explicit
            .and_then(|kind| self.ids.get(kind))
            .map(Target::id)
            .into_iter()
            .collect();

        if let Some(TargetState::Ready(resolved)) = self.resolved.get(&over) {
            for target in resolved {
                if !targets.iter().any(|t| t.key == target.key) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }

    async fn run_targets(&mut self, spec: &TaskSpec, over: ResourceKind, targets: Vec<Target>) {
        let resolver_failure = match self.resolved.get(&over) {
            Some(TargetState::Failed(reason)) => Some(reason.clone()),
            _ => None,
        };

        if targets.is_empty() {
            let reason = match (&resolver_failure, self.resolved.get(&over)) {
                (Some(reason), _) => reason.clone(),
                (None, Some(_)) => format!("no {} resolved", over),
                (None, None) => NO_IDENTIFIER.to_string(),
            };
            debug!("Skipping {}: {}", spec.label(), reason);
            self.results
                .push(RunResult::skipped(spec.category, spec.name, reason));
            return;
        }

        for target in targets {
            let mut vars = self.vars.clone();
            vars.extend(target.vars.clone());
            let task = format!("{}[{}]", spec.name, target.key);
            let step = self.run_step(spec, &task, &vars, false).await;
            self.record(spec, task, step);

            if spec.kind == TaskKind::ContainerLogs && target.restart_count > 0 {
                debug!(
                    "{} restarted {} time(s); collecting previous log",
                    target.key, target.restart_count
                );
                let task = format!("{}_previous[{}]", spec.name, target.key);
                let step = self.run_step(spec, &task, &vars, true).await;
                self.record(spec, task, step);
            }
        }

        // Explicit targets ran, but the resolved share never existed.
        if let Some(reason) = resolver_failure {
            debug!("Skipping resolved {} for {}: {}", over, spec.label(), reason);
            self.results
                .push(RunResult::skipped(spec.category, spec.name, reason));
        }
    }

    fn record(&mut self, spec: &TaskSpec, task: String, step: Step) {
        self.results.push(step.into_result(spec.category, task));
    }

    /// Run one command and write its artifact; the caller records the result.
    async fn run_step(&self, spec: &TaskSpec, task: &str, vars: &Vars, previous: bool) -> Step {
        let Some((command, file)) = prepare(spec, vars, previous) else {
            let reason = format!("unresolved placeholder in {}", spec.label());
            warn!("{}", reason);
            return Step::failed(reason);
        };

        debug!("Running {}", command);
        match self.runner.run(&command, self.timeout).await {
            Ok(outcome) if outcome.success() => {
                let content = ArtifactContent::from_output(&file, &outcome.stdout);
                match self.writer.write(spec.category, &file, content) {
                    Ok(artifact) => {
                        info!("Collected {}/{}", spec.category, task);
                        Step::Collected { outcome, artifact }
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        warn!("{}/{} failed: {}", spec.category, task, reason);
                        Step::failed(reason)
                    }
                }
            }
            Ok(outcome) => {
                let reason = outcome.diagnostic();
                warn!("{}/{} failed: {}", spec.category, task, reason);
                self.write_failure(spec.category, &file, &command, &reason, Some(&outcome));
                Step::Failed {
                    reason,
                    exit_code: outcome.exit_code,
                }
            }
            Err(err) => {
                let reason = match err {
                    RunnerError::Timeout(_) => "timeout".to_string(),
                    other => other.to_string(),
                };
                warn!("{}/{} failed: {}", spec.category, task, reason);
                self.write_failure(spec.category, &file, &command, &reason, None);
                Step::failed(reason)
            }
        }
    }

/// Failed commands keep their artifact path, holding the failure instead of data.
    fn write_failure(
        &self,
        category: Category,
        file: &str,
        command: &CommandSpec,
        reason: &str,
        outcome: Option<&RunOutcome>,
    ) {
        let mut text = format!("ERROR: {}\ncommand: {}\n", reason, command);
        if let Some(outcome) = outcome {
            if let Some(code) = outcome.exit_code {
                let _ = writeln!(text, "exit code: {}", code);
            }
            if !outcome.stderr.trim().is_empty() {
                let _ = write!(text, "\n--- stderr ---\n{}", outcome.stderr);
            }
            if !outcome.stdout.trim().is_empty() {
                let _ = write!(text, "\n--- stdout ---\n{}", outcome.stdout);
            }
        }

        if let Err(e) = self
            .writer
            .write(category, file, ArtifactContent::Text(text))
        {
            warn!("Could not record failure for {}/{}: {}", category, file, e);
        }
    }
}

/// Render the command and artifact name for a task.
fn prepare(spec: &TaskSpec, vars: &Vars, previous: bool) -> Option<(CommandSpec, String)> {
    let mut args = spec
        .args
        .iter()
        .map(|arg| render(arg, vars))
        .collect::<Option<Vec<_>>>()?;
    let mut file = render(spec.file, vars)?;

    if previous {
        args.push("--previous".to_string());
        file = match file.strip_suffix(".log") {
            Some(stem) => format!("{}_previous.log", stem),
            None => format!("{}_previous", file),
        };
    }

    Some((CommandSpec::new(spec.backend, args), file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::plan;
    use crate::identifiers::Mode;
    use crate::report::RunStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers by command-line prefix; anything unmatched succeeds with empty output.
    #[derive(Default)]
    struct FakeRunner {
        responses: Vec<(String, Result<RunOutcome, Duration>)>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn respond(mut self, prefix: &str, outcome: RunOutcome) -> Self {
            self.responses.push((prefix.to_string(), Ok(outcome)));
            self
        }

        fn time_out(mut self, prefix: &str) -> Self {
            self.responses
                .push((prefix.to_string(), Err(Duration::from_secs(5))));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            command: &CommandSpec,
            _timeout: Option<Duration>,
        ) -> Result<RunOutcome, RunnerError> {
            let line = command.to_string();
            self.calls.lock().unwrap().push(line.clone());
            match self.responses.iter().find(|(p, _)| line.starts_with(p.as_str())) {
                Some((_, Ok(outcome))) => Ok(outcome.clone()),
                Some((_, Err(limit))) => Err(RunnerError::Timeout(*limit)),
                None => Ok(RunOutcome::ok("")),
            }
        }
    }

    fn vm_ids() -> IdentifierSet {
        IdentifierSet {
            vm: Some("vm-1".to_string()),
            ..Default::default()
        }
    }

    fn status_of<'r>(results: &'r [RunResult], task: &str) -> &'r RunStatus {
        &results
            .iter()
            .find(|r| r.task == task)
            .unwrap_or_else(|| panic!("no result for {}", task))
            .status
    }

    #[tokio::test]
    async fn test_fan_out_over_resolved_ports() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = vm_ids();
        let runner = FakeRunner::default().respond(
            "openstack port list",
            RunOutcome::ok(
                r#"[{"ID": "p1", "Network ID": "n1", "Security Groups": ["sg1"]},
                    {"ID": "p2", "Network ID": "n1", "Security Groups": []}]"#,
            ),
        );

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        assert!(matches!(status_of(&results, "port_show[p1]"), RunStatus::Success { .. }));
        assert!(matches!(status_of(&results, "port_show[p2]"), RunStatus::Success { .. }));
        assert!(matches!(status_of(&results, "network_show[n1]"), RunStatus::Success { .. }));
        assert!(matches!(
            status_of(&results, "security_group_rules[sg1]"),
            RunStatus::Success { .. }
        ));
        assert!(dir.path().join("neutron/port_p2.txt").exists());
        assert_eq!(
            runner.calls().iter().filter(|c| c.starts_with("openstack network show")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_explicit_id_unions_with_resolved() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = IdentifierSet {
            vm: Some("vm-1".to_string()),
            volume: Some("vol-a".to_string()),
            ..Default::default()
        };
        let runner = FakeRunner::default().respond(
            "openstack server volume list",
            RunOutcome::ok(r#"[{"Volume ID": "vol-b"}, {"Volume ID": "vol-a"}]"#),
        );

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        let volumes: Vec<&str> = results
            .iter()
            .filter(|r| r.task.starts_with("volume_show"))
            .map(|r| r.task.as_str())
            .collect();
        assert_eq!(volumes, vec!["volume_show[vol-a]", "volume_show[vol-b]"]);
    }

    #[tokio::test]
    async fn test_failed_resolver_skips_dependents() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = vm_ids();
        let runner = FakeRunner::default().respond(
            "openstack server volume list",
            RunOutcome::failed(1, "No volume with a name or ID of 'vm-1' exists.\n"),
        );

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        assert_eq!(
            status_of(&results, "attached_volumes"),
            &RunStatus::Failed {
                error: "No volume with a name or ID of 'vm-1' exists.".to_string(),
                exit_code: Some(1),
            }
        );
        assert_eq!(
            status_of(&results, "volume_show"),
            &RunStatus::Skipped {
                reason: "attached_volumes failed: No volume with a name or ID of 'vm-1' exists."
                    .to_string(),
            }
        );
        let artifact =
            std::fs::read_to_string(dir.path().join("cinder/attached_volumes.json")).unwrap();
        assert!(artifact.starts_with("ERROR: No volume"));
        assert!(!runner.calls().iter().any(|c| c.starts_with("openstack volume show")));
    }

    #[tokio::test]
    async fn test_unparseable_resolver_output_fails() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = vm_ids();
        let runner = FakeRunner::default()
            .respond("openstack server show vm-1 -f json", RunOutcome::ok("<html>oops</html>"));

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        let server: Vec<&RunResult> = results.iter().filter(|r| r.task == "server").collect();
        assert_eq!(server.len(), 1);
        match &server[0].status {
            RunStatus::Failed { error, exit_code } => {
                assert!(error.starts_with("unparseable output"));
                assert_eq!(*exit_code, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nova/server.json")).unwrap(),
            "<html>oops</html>\n"
        );
        match status_of(&results, "image_show") {
            RunStatus::Skipped { reason } => assert!(reason.starts_with("server failed: ")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_explicit_targets_still_report_failed_resolver() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = IdentifierSet {
            vm: Some("vm-1".to_string()),
            volume: Some("vol-a".to_string()),
            ..Default::default()
        };
        let runner = FakeRunner::default().respond(
            "openstack server volume list",
            RunOutcome::failed(1, "Forbidden (HTTP 403)"),
        );

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        let volumes: Vec<(&str, &str)> = results
            .iter()
            .filter(|r| r.task.starts_with("volume_show"))
            .map(|r| (r.task.as_str(), r.status_label()))
            .collect();
        assert_eq!(
            volumes,
            vec![("volume_show[vol-a]", "SUCCESS"), ("volume_show", "SKIPPED")]
        );
        assert_eq!(
            status_of(&results, "volume_show"),
            &RunStatus::Skipped {
                reason: "attached_volumes failed: Forbidden (HTTP 403)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resources_with_colliding_file_names() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = IdentifierSet {
            stack: Some("stack-1".to_string()),
            vm: Some("vm-1".to_string()),
            ..Default::default()
        };
        let runner = FakeRunner::default().respond(
            "openstack stack resource list",
            RunOutcome::ok(r#"[{"resource_name": "my res"}, {"resource_name": "my_res"}]"#),
        );

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        let paths: Vec<std::path::PathBuf> = ["stack_resource_show[my res]", "stack_resource_show[my_res]"]
            .iter()
            .map(|task| match status_of(&results, task) {
                RunStatus::Success { path, .. } => path.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(paths[0], std::path::PathBuf::from("heat/resource_my_res.txt"));
        assert_eq!(paths[1], std::path::PathBuf::from("heat/resource_my_res-2.txt"));
        assert!(paths.iter().all(|p| dir.path().join(p).is_file()));
    }

    #[tokio::test]
    async fn test_empty_resolution_is_reported() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = vm_ids();
        let runner = FakeRunner::default()
            .respond("openstack server volume list", RunOutcome::ok("[]"));

        let results = Engine::new(&runner, &writer, &ids, None)
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        assert_eq!(
            status_of(&results, "volume_show"),
            &RunStatus::Skipped {
                reason: "no volume resolved".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let ids = vm_ids();
        let runner = FakeRunner::default().time_out("openstack hypervisor list");

        let results = Engine::new(&runner, &writer, &ids, Some(Duration::from_secs(5)))
            .execute(&plan(Mode::Restricted, &ids))
            .await;

        assert_eq!(
            status_of(&results, "hypervisors"),
            &RunStatus::Failed {
                error: "timeout".to_string(),
                exit_code: None
            }
        );
        assert!(matches!(status_of(&results, "server_show"), RunStatus::Success { .. }));
    }

    #[test]
    fn test_prepare_previous_log() {
        let spec = crate::collectors::CATALOG
            .iter()
            .find(|s| s.kind == TaskKind::ContainerLogs)
            .unwrap();
        let mut vars = Vars::new();
        vars.insert("namespace".to_string(), "openstack".to_string());
        vars.insert("pod".to_string(), "nova-api-0".to_string());
        vars.insert("container".to_string(), "nova-api".to_string());

        let (command, file) = prepare(spec, &vars, true).unwrap();
        assert_eq!(
            command.to_string(),
            "kubectl logs nova-api-0 -n openstack -c nova-api --previous"
        );
        assert_eq!(file, "nova-api-0_nova-api_previous.log");
    }
}
