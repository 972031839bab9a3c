//! Remote command executor
//!
//! Runs an ad-hoc script inside a session's container. Cluster and timeout
//! failures are returned as structured [`ExecutionResult`] errors rather than
//! propagated, so callers always get an outcome back.

use kjob_core::domain::execution::{
    ExecutionError, ExecutionOutput, ExecutionResult, ExecutionStatus,
};
use kjob_core::domain::log::LogKind;
use kjob_core::domain::progress::ProgressEvent;
use kjob_core::dto::execution::ExecuteConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::progress::{ProgressSink, emit_safely};
use super::registry::SessionData;
use crate::cluster::ClusterGateway;
use crate::error::{Result, WorkerError};

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Turns a script into an argument vector
///
/// Scripts with newlines, `;`, `|` or `&&` go through `<shell> -c`; anything
/// else is split on whitespace and run directly.
pub fn build_command(script: &str, shell: &str) -> Result<Vec<String>> {
    let needs_shell =
        ['\n', ';', '|'].iter().any(|c| script.contains(*c)) || script.contains("&&");
    if needs_shell {
        return Ok(vec![shell.to_string(), "-c".to_string(), script.to_string()]);
    }

    let argv: Vec<String> = script.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(WorkerError::Validation("Script must not be empty".to_string()));
    }
    Ok(argv)
}

/// Executes a command in the pod of a started session
///
/// # Arguments
/// * `gateway` - Cluster access
/// * `pod_name` - Target pod
/// * `data` - Workload data of the session (log buffers, default container)
/// * `command` - Argument vector built by [`build_command`]
/// * `config` - Per-call overrides
/// * `default_timeout` - Budget when `config` sets none
/// * `progress` - Optional progress sink
pub async fn run_command(
    gateway: &dyn ClusterGateway,
    pod_name: &str,
    data: &SessionData,
    command: Vec<String>,
    config: &ExecuteConfig,
    default_timeout: Duration,
    progress: Option<&Arc<dyn ProgressSink>>,
) -> ExecutionResult {
    emit_safely(
        progress,
        ProgressEvent::info(format!("Executing command in pod {}...", pod_name)),
    )
    .await;

    let timeout = config
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);
    let container = config.container.as_deref().unwrap_or(&data.container);

    info!("Executing command in pod {}: {:?}", pod_name, command);

    let outcome =
        tokio::time::timeout(timeout, gateway.exec(pod_name, container, command)).await;

    let output = match outcome {
        Err(_) => {
            let err = WorkerError::Timeout(format!(
                "Command execution timed out after {} seconds",
                timeout.as_secs()
            ));
            let message = err.to_string();
            error!("{} (pod {})", message, pod_name);
            emit_safely(progress, ProgressEvent::error(message.clone())).await;
            return ExecutionResult::failure(err.kind(), message.clone(), vec![message]);
        }
        Ok(Err(e)) => {
            let message = format!("Kubernetes API error during command execution: {}", e);
            error!("Failed to execute command in pod {}: {}", pod_name, e);
            emit_safely(progress, ProgressEvent::error(message.clone())).await;
            data.logs.lock().await.push(LogKind::Error, message.clone());
            return ExecutionResult::failure("KubernetesApiError", e.to_string(), vec![message]);
        }
        Ok(Ok(output)) => output,
    };

    let stdout = output.stdout.trim_end_matches('\n');
    let stderr = output.stderr.trim_end_matches('\n');

    let mut outputs = Vec::new();
    if !stdout.is_empty() {
        outputs.push(ExecutionOutput::stream("stdout", stdout));
    }
    if !stderr.is_empty() {
        outputs.push(ExecutionOutput::stream("stderr", stderr));
    }

    // no exit status reported counts as success
    let success = output.exit_code.is_none_or(|code| code == 0);

    {
        let mut logs = data.logs.lock().await;
        if !stdout.is_empty() {
            logs.push(LogKind::Stdout, stdout);
        }
        if !stderr.is_empty() {
            logs.push(LogKind::Stderr, stderr);
        }
        logs.push(
            LogKind::Info,
            format!(
                "Command executed at {} - Status: {}",
                chrono::Utc::now().to_rfc3339(),
                if success { "success" } else { "error" }
            ),
        );
    }

    let error = match output.exit_code {
        Some(code) if !success => {
            let message = format!("Command failed with return code {}", code);
            emit_safely(
                progress,
                ProgressEvent::error(format!("Command failed with return code: {}", code)),
            )
            .await;
            Some(ExecutionError {
                kind: "CommandError".to_string(),
                trace: vec![if stderr.is_empty() {
                    message.clone()
                } else {
                    stderr.to_string()
                }],
                message,
            })
        }
        _ => {
            emit_safely(progress, ProgressEvent::success("Command executed successfully")).await;
            None
        }
    };

    ExecutionResult {
        status: if success {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::Error
        },
        outputs,
        error,
    }
}
