//! Environment checks that must pass before any artifact is written.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::identifiers::{IdKind, IdentifierSet, Mode};
use crate::runner::{Backend, CommandRunner, CommandSpec, RunnerError};

/// Looks up an environment variable.
pub type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Process environment, ignoring empty values.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Verify credentials and backend reachability for `mode`.
pub async fn check<R: CommandRunner + ?Sized>(
    runner: &R,
    settings: &Settings,
    mode: Mode,
    ids: &IdentifierSet,
    env: &EnvLookup,
) -> Result<()> {
    check_credentials(settings, env)?;

    let timeout = settings.command_timeout();
    let token = CommandSpec::new(
        Backend::OpenStack,
        ["token", "issue", "-f", "value", "-c", "expires"],
    );
    probe(runner, &token, timeout, |detail| {
        Error::environment(
            format!("could not obtain an OpenStack token: {}", detail),
            "Verify the credentials in your openrc file or clouds.yaml",
        )
    })
    .await?;
    debug!("OpenStack credentials accepted");

    if !mode.has_orchestration_backend() {
        return Ok(());
    }

    let kubeconfig = kubeconfig_path(settings, env).ok_or_else(|| {
        Error::environment(
            "no kubeconfig found",
            "Set KUBECONFIG, pass --kubeconfig or create ~/.kube/config",
        )
    })?;
    debug!("Using kubeconfig {}", kubeconfig.display());

    let context = CommandSpec::new(Backend::Kubectl, ["config", "current-context"]);
    probe(runner, &context, timeout, |detail| {
        Error::environment(
            format!("no usable kubectl context: {}", detail),
            "Select a context with `kubectl config use-context`",
        )
    })
    .await?;

    if let Some(namespace) = ids.get(IdKind::Namespace) {
        let lookup = CommandSpec::new(Backend::Kubectl, ["get", "namespace", namespace]);
        probe(runner, &lookup, timeout, |detail| {
            Error::environment(
                format!("namespace '{}' is not accessible: {}", namespace, detail),
                "Check the namespace name and your RBAC permissions",
            )
        })
        .await?;
    }

    Ok(())
}

/// `OS_CLOUD`, or every required variable.
fn check_credentials(settings: &Settings, env: &EnvLookup) -> Result<()> {
    if env("OS_CLOUD").is_some() {
        return Ok(());
    }

    let missing: Vec<&str> = settings
        .required_env
        .iter()
        .map(String::as_str)
        .filter(|key| env(*key).is_none())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::environment(
            format!("missing OpenStack credentials: {}", missing.join(", ")),
            "Source your openrc file or set OS_CLOUD",
        ))
    }
}

/// Run one probe command; anything but exit 0 becomes the error from `rejected`.
async fn probe<R, F>(
    runner: &R,
    command: &CommandSpec,
    timeout: Option<Duration>,
    rejected: F,
) -> Result<()>
where
    R: CommandRunner + ?Sized,
    F: FnOnce(String) -> Error,
{
    debug!("Probing: {}", command);
    match runner.run(command, timeout).await {
        Ok(outcome) if outcome.success() => Ok(()),
        Ok(outcome) => Err(rejected(outcome.diagnostic())),
        Err(err @ RunnerError::Spawn { .. }) => Err(Error::environment(
            format!("{} backend not found: {}", command.backend, err),
            format!(
                "Install the {} client or point osdebug at it in the configuration",
                command.backend
            ),
        )),
        Err(err @ RunnerError::Timeout(_)) => Err(Error::environment(
            format!("{} backend unreachable: {}", command.backend, err),
            "Check network connectivity to the API endpoint",
        )),
    }
}

/// Kubeconfig kubectl would use: configured path, first existing `KUBECONFIG` entry,
/// then `~/.kube/config`.
pub fn kubeconfig_path(settings: &Settings, env: &EnvLookup) -> Option<PathBuf> {
    if let Some(path) = &settings.backends.kubeconfig {
        return path.is_file().then(|| path.clone());
    }

    if let Some(list) = env("KUBECONFIG") {
        return std::env::split_paths(&list).find(|p| p.is_file());
    }

    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .filter(|p| p.is_file())
}
