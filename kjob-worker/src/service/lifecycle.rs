//! Session lifecycle manager
//!
//! Drives every session through STARTING -> RUNNING -> STOPPING -> STOPPED
//! (or FAILED), orchestrating the workload builders, the cluster gateway and the
//! startup wait loops. This is the surface the RPC layer exposes.

use chrono::Utc;
use kjob_core::domain::execution::ExecutionResult;
use kjob_core::domain::log::LogKind;
use kjob_core::domain::manifest::Manifest;
use kjob_core::domain::progress::ProgressEvent;
use kjob_core::domain::session::{AppType, SessionInfo, SessionStatus};
use kjob_core::dto::execution::ExecuteConfig;
use kjob_core::dto::log::{LogPage, LogQuery};
use kjob_core::dto::session::{CompiledApp, StartRequest};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::exec::{DEFAULT_SHELL, build_command, run_command};
use super::log_buffer::SessionLogs;
use super::progress::{ProgressSink, StartupReporter, emit_safely};
use super::registry::{SessionData, SessionRegistry};
use crate::cluster::ClusterGateway;
use crate::config::Config;
use crate::error::{Result, WorkerError};
use crate::scheduler::{PodReadiness, ServiceRegistry, wait_for_pod, wait_for_service};
use crate::workload::{LaunchContext, WorkloadVariant, variant_for};

/// The worker's session manager
pub struct SessionManager {
    config: Config,
    gateway: Arc<dyn ClusterGateway>,
    services: Arc<dyn ServiceRegistry>,
    sessions: SessionRegistry,
}

impl SessionManager {
    /// Creates a manager over shared cluster and mesh connections
    pub fn new(
        config: Config,
        gateway: Arc<dyn ClusterGateway>,
        services: Arc<dyn ServiceRegistry>,
    ) -> Self {
        Self {
            config,
            gateway,
            services,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =============================================================================
    // Worker Descriptor
    // =============================================================================

    /// Application types this worker can start
    pub fn supported_types(&self) -> Vec<&'static str> {
        AppType::ALL.iter().map(AppType::as_str).collect()
    }

    pub fn name(&self) -> String {
        "Kubernetes Worker".to_string()
    }

    pub fn description(&self) -> String {
        format!(
            "A worker for launching jobs in Kubernetes namespace {}",
            self.config.namespace
        )
    }

    /// Calls carry the caller's context
    pub fn require_context(&self) -> bool {
        true
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    // =============================================================================
    // Operations
    // =============================================================================

    /// Validates a manifest and fills in its defaults
    pub async fn compile(
        &self,
        manifest: Map<String, JsonValue>,
        files: Vec<JsonValue>,
    ) -> Result<CompiledApp> {
        let app_type = Manifest::app_type_of(&manifest)?;
        let manifest = variant_for(app_type).compile(manifest, &self.config)?;
        Ok(CompiledApp { manifest, files })
    }

    /// Starts a session and blocks until its workload is up
    ///
    /// On failure the session is evicted before the error is returned, and the
    /// progress sink receives an `error` event first.
    pub async fn start(
        &self,
        request: StartRequest,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<String> {
        let session_id = request.id.clone();
        let _guard = self.sessions.lock_id(&session_id).await;

        if self.sessions.contains(&session_id).await {
            self.sessions.release_id(&session_id).await;
            return Err(WorkerError::SessionExists(session_id));
        }

        let result = self.start_locked(&request, progress.clone()).await;

        if let Err(e) = &result {
            emit_safely(
                progress.as_ref(),
                ProgressEvent::error(format!("Failed to start Kubernetes session: {}", e)),
            )
            .await;
            error!("Failed to start Kubernetes session {}: {}", session_id, e);

            if !matches!(e, WorkerError::SessionExists(_)) {
                self.sessions
                    .set_status(&session_id, SessionStatus::Failed, Some(e.to_string()))
                    .await;
                self.sessions.remove(&session_id).await;
            }
        }

        self.sessions.release_id(&session_id).await;
        result
    }

    async fn start_locked(
        &self,
        request: &StartRequest,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<String> {
        let session_id = &request.id;
        let app_type = Manifest::app_type_of(&request.manifest)?;
        let variant = variant_for(app_type);
        let manifest = variant.parse_manifest(&request.manifest)?;

        emit_safely(
            progress.as_ref(),
            ProgressEvent::info(format!(
                "Starting Kubernetes {} session {}",
                app_type, session_id
            )),
        )
        .await;

        self.sessions
            .insert_starting(SessionInfo {
                session_id: session_id.clone(),
                app_id: request.app_id.clone(),
                workspace: request.workspace.clone(),
                client_id: request.client_id.clone(),
                app_type,
                status: SessionStatus::Starting,
                entry_point: request.entry_point.clone(),
                created_at: Utc::now(),
                metadata: request.manifest.clone(),
                error: None,
            })
            .await?;

        let reporter = StartupReporter::new(progress.clone());
        let data = self.launch(variant, request, &manifest, reporter).await?;

        self.sessions.mark_running(session_id, data).await?;

        emit_safely(
            progress.as_ref(),
            ProgressEvent::success(format!(
                "Kubernetes {} session {} started successfully",
                app_type, session_id
            )),
        )
        .await;
        info!("Started Kubernetes {} session {}", app_type, session_id);

        Ok(session_id.clone())
    }

    /// Builds, submits and waits for one workload
    async fn launch(
        &self,
        variant: &dyn WorkloadVariant,
        request: &StartRequest,
        manifest: &Manifest,
        mut reporter: StartupReporter,
    ) -> Result<SessionData> {
        let service_id = variant.service_id(manifest);
        let ctx = LaunchContext::new(request, manifest, &self.config, service_id);
        let job_name = ctx.job_name.clone();

        reporter
            .report(ProgressEvent::info(variant.creating_message(&ctx)))
            .await;

        let spec = variant.build_spec(&ctx)?;
        spec.validate()?;

        if let Err(e) = self.gateway.create_job(&spec).await {
            reporter
                .report(ProgressEvent::error(format!("Kubernetes API error: {}", e)))
                .await;
            return Err(WorkerError::Operation(format!("Failed to create job: {}", e)));
        }
        info!("Created job {} for session {}", job_name, ctx.session_id);

        reporter
            .report(ProgressEvent::success(format!(
                "Job {} created successfully",
                job_name
            )))
            .await;
        reporter
            .report(ProgressEvent::info("Waiting for job pod to start..."))
            .await;

        let timings = &self.config.timings;
        let readiness = match wait_for_pod(self.gateway.as_ref(), &job_name, timings).await {
            Ok(readiness) => readiness,
            Err(e) => {
                self.discard_job(&job_name).await;
                return Err(e);
            }
        };

        match &readiness {
            PodReadiness::Running(pod) => {
                reporter
                    .report(ProgressEvent::success(format!("Pod {} is now running", pod)))
                    .await;
            }
            PodReadiness::Completed(pod) => {
                reporter
                    .report(ProgressEvent::info(format!("Pod {} completed immediately", pod)))
                    .await;
            }
        }
        let pod_name = readiness.pod_name().to_string();

        if let Some(service_id) = &ctx.service_id {
            if variant.wait_for_service(manifest) {
                let workspace = variant.registration_workspace(&ctx);
                reporter
                    .report(ProgressEvent::info(format!(
                        "Waiting for service '{}' to be registered...",
                        service_id
                    )))
                    .await;
                wait_for_service(
                    self.services.as_ref(),
                    &workspace,
                    service_id,
                    &self.config.timings,
                    &mut reporter,
                )
                .await;
            }
        }

        let mut logs = SessionLogs::new();
        logs.push(
            LogKind::Info,
            format!("{} session started successfully", variant.label()),
        );
        logs.push(
            LogKind::Info,
            format!("{} {} started and running as pod {}", variant.label(), job_name, pod_name),
        );

        let timeout = ctx.timeout();
        let service_id = ctx.service_id.clone();
        for line in reporter.into_journal() {
            logs.push(LogKind::Progress, line);
        }

        Ok(SessionData {
            job_name,
            pod_name: Some(pod_name),
            service_id,
            container: variant.container_name().to_string(),
            timeout,
            logs: Mutex::new(logs),
        })
    }

    /// Best-effort removal of a job whose startup failed after submission
    async fn discard_job(&self, job_name: &str) {
        match self.gateway.delete_job(job_name).await {
            Ok(()) => info!("Deleted job {} after failed startup", job_name),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Failed to delete job {} after failed startup: {}", job_name, e),
        }
    }

    /// Stops a session and deletes its workload
    ///
    /// Unknown sessions are ignored. Local state is evicted even when the
    /// deletion fails; the deletion error is still returned.
    pub async fn stop(&self, session_id: &str) -> Result<()> {
        let _guard = self.sessions.lock_id(session_id).await;

        let data = match self.sessions.data(session_id).await {
            Ok(data) => data,
            Err(_) => {
                warn!("Kubernetes job session {} not found for stopping", session_id);
                self.sessions.release_id(session_id).await;
                return Ok(());
            }
        };

        self.sessions
            .set_status(session_id, SessionStatus::Stopping, None)
            .await;

        let outcome = match data {
            Some(data) => self.delete_job(&data.job_name, session_id).await,
            None => Ok(()),
        };

        match &outcome {
            Ok(()) => {
                self.sessions
                    .set_status(session_id, SessionStatus::Stopped, None)
                    .await;
                info!("Stopped Kubernetes job session {}", session_id);
            }
            Err(e) => {
                self.sessions
                    .set_status(session_id, SessionStatus::Failed, Some(e.to_string()))
                    .await;
                error!("Failed to stop Kubernetes job session {}: {}", session_id, e);
            }
        }

        self.sessions.remove(session_id).await;
        self.sessions.release_id(session_id).await;
        outcome
    }

    async fn delete_job(&self, job_name: &str, session_id: &str) -> Result<()> {
        info!("Stopping Kubernetes job {} for session {}", job_name, session_id);
        match self.gateway.delete_job(job_name).await {
            Ok(()) => {
                info!("Successfully deleted job {}", job_name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Job {} was already deleted", job_name);
                Ok(())
            }
            Err(e) => Err(WorkerError::Operation(format!(
                "Failed to delete job {}: {}",
                job_name, e
            ))),
        }
    }

    /// Sessions of one workspace
    pub async fn list_sessions(&self, workspace: &str) -> Vec<SessionInfo> {
        self.sessions.list(workspace).await
    }

    pub async fn get_session_info(&self, session_id: &str) -> Result<SessionInfo> {
        self.sessions.get(session_id).await
    }

    /// Returns a page of the session's logs
    ///
    /// The container's current output is merged into `stdout` first when the
    /// pod is known; fetch failures only produce a warning.
    pub async fn get_logs(&self, session_id: &str, query: LogQuery) -> Result<LogPage> {
        let Some(data) = self.sessions.data(session_id).await? else {
            return Ok(LogPage::empty(&query));
        };

        if let Some(pod_name) = &data.pod_name {
            match self.gateway.pod_logs(pod_name, &data.container).await {
                Ok(output) => data.logs.lock().await.ingest_live(&output),
                Err(e) => warn!("Could not fetch logs for pod {}: {}", pod_name, e),
            }
        }

        Ok(data.logs.lock().await.page(&query))
    }

    /// Runs a script in the session's pod
    ///
    /// Unknown sessions and sessions without a pod are errors; everything that
    /// happens once the command is dispatched is reported in the result.
    pub async fn execute(
        &self,
        session_id: &str,
        script: &str,
        config: Option<ExecuteConfig>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<ExecutionResult> {
        let data = self.sessions.data(session_id).await?.ok_or_else(|| {
            WorkerError::Operation(format!("No pod data available for session {}", session_id))
        })?;
        let pod_name = data.pod_name.clone().ok_or_else(|| {
            WorkerError::Operation(format!("No pod name found for session {}", session_id))
        })?;

        let config = config.unwrap_or_default();
        let command = build_command(script, config.shell.as_deref().unwrap_or(DEFAULT_SHELL))?;

        Ok(run_command(
            self.gateway.as_ref(),
            &pod_name,
            &data,
            command,
            &config,
            self.config.timings.exec_timeout,
            progress.as_ref(),
        )
        .await)
    }

    /// Stops every tracked session, one at a time
    pub async fn shutdown(&self) {
        info!("Shutting down Kubernetes worker...");

        for session_id in self.sessions.ids().await {
            if let Err(e) = self.stop(&session_id).await {
                warn!("Failed to stop Kubernetes job session {}: {}", session_id, e);
            }
        }

        info!("Kubernetes worker shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeGateway;
    use crate::cluster::{ExecOutput, GatewayError, PodPhase, PodSummary};
    use crate::scheduler::service_waiter::fake::FakeRegistry;
    use crate::service::progress::tests::{FailingSink, RecordingSink};
    use kjob_core::domain::progress::ProgressKind;
    use serde_json::json;

    fn manager(gateway: Arc<FakeGateway>, registry: Arc<FakeRegistry>) -> SessionManager {
        SessionManager::new(Config::default(), gateway, registry)
    }

    fn request(id: &str, manifest: JsonValue) -> StartRequest {
        StartRequest {
            id: id.to_string(),
            app_id: "my-app".to_string(),
            workspace: "ws-1".to_string(),
            client_id: "client-1".to_string(),
            server_url: None,
            token: None,
            entry_point: None,
            artifact_id: None,
            manifest: manifest.as_object().cloned().unwrap(),
        }
    }

    fn busybox() -> JsonValue {
        json!({"image": "busybox:latest", "command": ["echo", "hi"]})
    }

    fn running_gateway() -> Arc<FakeGateway> {
        Arc::new(FakeGateway::new().with_pods(vec![PodSummary::new("pod-1", PodPhase::Running)]))
    }

    fn sink() -> (Arc<RecordingSink>, Option<Arc<dyn ProgressSink>>) {
        let sink = Arc::new(RecordingSink::default());
        let dyn_sink: Arc<dyn ProgressSink> = sink.clone();
        (sink, Some(dyn_sink))
    }

    async fn assert_no_residue(manager: &SessionManager, id: &str) {
        assert!(!manager.sessions.contains(id).await);
        assert!(!manager.sessions.has_data(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_job_end_to_end() {
        let gateway = Arc::new(
            FakeGateway::new().with_pods(vec![PodSummary::new("pod-1", PodPhase::Succeeded)]),
        );
        gateway.set_logs("pod-1", "hi\n");
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));

        let id = manager.start(request("ws-1/job-a", busybox()), None).await.unwrap();
        assert_eq!(id, "ws-1/job-a");

        let info = manager.get_session_info(&id).await.unwrap();
        assert_eq!(info.status, SessionStatus::Running);
        assert_eq!(info.app_type, AppType::Job);
        assert_eq!(info.metadata["image"], "busybox:latest");

        let created = gateway.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].job_name, "hypha-job-ws-1-job-a");
        assert_eq!(
            created[0].container.command,
            Some(vec!["echo".to_string(), "hi".to_string()])
        );

        let query = LogQuery {
            kind: Some("stdout".to_string()),
            ..LogQuery::default()
        };
        let page = manager.get_logs(&id, query.clone()).await.unwrap();
        assert!(page.items.iter().any(|item| item.content.contains("hi")));

        // a second fetch does not duplicate the container output
        let again = manager.get_logs(&id, query).await.unwrap();
        assert_eq!(again.total, page.total);

        manager.stop(&id).await.unwrap();
        assert_eq!(gateway.deleted(), vec!["hypha-job-ws-1-job-a".to_string()]);
        assert!(matches!(
            manager.get_session_info(&id).await,
            Err(WorkerError::SessionNotFound(_))
        ));
        assert_no_residue(&manager, &id).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_without_registration_still_runs() {
        let gateway = running_gateway();
        let registry = Arc::new(FakeRegistry::never_registers());
        let manager = manager(gateway, registry.clone());
        let (sink, progress) = sink();

        let id = manager
            .start(
                request("ws-1/agent", json!({"type": "claude-agent", "wait_for_service": true})),
                progress,
            )
            .await
            .unwrap();

        assert_eq!(
            manager.get_session_info(&id).await.unwrap().status,
            SessionStatus::Running
        );

        let events = sink.events();
        assert!(events.iter().any(|e| e.kind == ProgressKind::Warning));
        assert_eq!(events.last().map(|e| e.kind), Some(ProgressKind::Success));

        let lookups = registry.lookups();
        assert!(!lookups.is_empty());
        assert!(lookups[0].starts_with("ws-1/claude-agent-"));

        let page = manager
            .get_logs(
                &id,
                LogQuery {
                    kind: Some("progress".to_string()),
                    ..LogQuery::default()
                },
            )
            .await
            .unwrap();
        assert!(page.items.iter().any(|item| item.content.starts_with("WARNING: ")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_environment_worker_waits_in_manifest_workspace() {
        let registry = Arc::new(FakeRegistry::found_after(1));
        let manager = manager(running_gateway(), registry.clone());

        let id = manager
            .start(
                request(
                    "ws-1/conda",
                    json!({"type": "conda-worker", "workspace": "shared", "service_id": "conda-x"}),
                ),
                None,
            )
            .await
            .unwrap();

        assert_eq!(registry.lookups(), vec!["shared/conda-x"; 2]);
        let info = manager.get_session_info(&id).await.unwrap();
        assert_eq!(info.app_type, AppType::EnvironmentWorker);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_registering_manifests_are_permissive() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::found_after(0)));
        let agent = json!({"type": "claude-agent", "verbose": "yes", "timeout": "600"});

        let compiled = manager
            .compile(agent.as_object().cloned().unwrap(), vec![])
            .await
            .unwrap();
        assert_eq!(compiled.manifest["verbose"], "yes");

        let id = manager.start(request("agent", agent), None).await.unwrap();
        let data = manager.sessions.data(&id).await.unwrap().unwrap();
        assert_eq!(data.timeout, 600);

        let conda = json!({"type": "conda-worker", "command": "ignored", "wait_for_service": 1});
        manager.start(request("conda", conda), None).await.unwrap();
        assert_eq!(
            manager.get_session_info("conda").await.unwrap().status,
            SessionStatus::Running
        );
    }

    #[tokio::test]
    async fn test_generic_manifest_shapes_stay_strict() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        let manifest = json!({"image": "busybox:latest", "command": "echo hi"});

        let err = manager.start(request("a", manifest), None).await.unwrap_err();

        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(gateway.created().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_job_does_not_wait_by_default() {
        let registry = Arc::new(FakeRegistry::never_registers());
        let manager = manager(running_gateway(), registry.clone());
        let mut manifest = busybox();
        manifest["service_id"] = json!("svc");

        manager.start(request("a", manifest), None).await.unwrap();

        assert!(registry.lookups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_is_rejected() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();

        let err = manager
            .start(request("a", json!({"image": "other:1"})), None)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::SessionExists(_)));
        let info = manager.get_session_info("a").await.unwrap();
        assert_eq!(info.status, SessionStatus::Running);
        assert_eq!(info.metadata["image"], "busybox:latest");
        assert!(manager.sessions.has_data("a").await);
        assert_eq!(gateway.created().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pod_leaves_no_residue() {
        let gateway = Arc::new(
            FakeGateway::new().with_pods(vec![PodSummary::new("pod-1", PodPhase::Failed)]),
        );
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        let (sink, progress) = sink();

        let err = manager.start(request("a", busybox()), progress).await.unwrap_err();

        assert!(matches!(err, WorkerError::Operation(_)));
        assert_no_residue(&manager, "a").await;
        assert_eq!(gateway.deleted(), vec!["hypha-job-a".to_string()]);

        let last = sink.events().pop().unwrap();
        assert_eq!(last.kind, ProgressKind::Error);
        assert!(last.message.contains("Pod pod-1 failed to start"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pod_timeout_fails_start() {
        let gateway = Arc::new(
            FakeGateway::new().with_pods(vec![PodSummary::new("pod-1", PodPhase::Pending)]),
        );
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));

        let err = manager.start(request("a", busybox()), None).await.unwrap_err();

        assert!(matches!(err, WorkerError::Timeout(_)));
        assert_no_residue(&manager, "a").await;
        assert_eq!(gateway.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_manifest_has_no_side_effects() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));

        for manifest in [json!({"image": "busybox"}), json!({}), json!({"type": "web-app"})] {
            let err = manager.start(request("a", manifest), None).await.unwrap_err();
            assert!(matches!(err, WorkerError::Validation(_)));
        }

        assert!(gateway.created().is_empty());
        assert_no_residue(&manager, "a").await;
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let gateway = running_gateway();
        gateway.fail_create(GatewayError::api(409, "already exists"));
        let manager = manager(gateway, Arc::new(FakeRegistry::never_registers()));
        let (sink, progress) = sink();

        let err = manager.start(request("a", busybox()), progress).await.unwrap_err();

        assert!(err.to_string().starts_with("Failed to create job"));
        assert_no_residue(&manager, "a").await;
        let errors = sink
            .events()
            .into_iter()
            .filter(|e| e.kind == ProgressKind::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_does_not_abort_start() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        let progress: Option<Arc<dyn ProgressSink>> = Some(Arc::new(FailingSink));

        assert!(manager.start(request("a", busybox()), progress).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_unknown_session_is_noop() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));

        manager.stop("missing").await.unwrap();
        assert!(gateway.deleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_tolerates_already_deleted_job() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();
        gateway.fail_delete(GatewayError::api(404, "not found"));

        manager.stop("a").await.unwrap();

        assert_no_residue(&manager, "a").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_still_cleans_up() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();
        gateway.fail_delete(GatewayError::api(500, "etcd unavailable"));

        let err = manager.stop("a").await.unwrap_err();

        assert!(err.to_string().contains("Failed to delete job hypha-job-a"));
        assert_no_residue(&manager, "a").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_sessions_by_workspace() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();
        let mut other = request("b", busybox());
        other.workspace = "ws-2".to_string();
        manager.start(other, None).await.unwrap();

        let sessions = manager.list_sessions("ws-1").await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "a");
        assert!(manager.list_sessions("ws-3").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_survive_fetch_failures() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();
        gateway.fail_logs(GatewayError::Transport("connection reset".into()));

        let page = manager.get_logs("a", LogQuery::default()).await.unwrap();

        assert!(page.total > 0);
        assert!(page.items.iter().all(|item| item.kind != LogKind::Stdout));
        let info: Vec<&str> = page
            .items
            .iter()
            .filter(|item| item.kind == LogKind::Info)
            .map(|item| item.content.as_str())
            .collect();
        assert_eq!(info[0], "Kubernetes job session started successfully");
        assert!(info[1].ends_with("running as pod pod-1"));
    }

    #[tokio::test]
    async fn test_logs_of_unknown_session() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        assert!(matches!(
            manager.get_logs("missing", LogQuery::default()).await,
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_dispatch() {
        let gateway = running_gateway();
        gateway.set_exec(Ok(ExecOutput {
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }));
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();

        let result = manager.execute("a", "echo a; echo b", None, None).await.unwrap();
        assert!(result.is_ok());
        manager.execute("a", "hostname", None, None).await.unwrap();

        let calls = gateway.exec_calls();
        assert_eq!(calls[0].0, "pod-1");
        assert_eq!(calls[0].1, "main");
        assert_eq!(calls[0].2, ["/bin/sh", "-c", "echo a; echo b"]);
        assert_eq!(calls[1].2, ["hostname"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout_is_structured() {
        let gateway = running_gateway();
        gateway.set_exec_delay(std::time::Duration::from_secs(120));
        let manager = manager(gateway, Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();

        let result = manager.execute("a", "sleep 120", None, None).await.unwrap();

        assert!(!result.is_ok());
        assert_eq!(result.error.unwrap().kind, "TimeoutError");
    }

    #[tokio::test]
    async fn test_execute_unknown_session() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        assert!(matches!(
            manager.execute("missing", "ls", None, None).await,
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let gateway = running_gateway();
        let manager = manager(gateway.clone(), Arc::new(FakeRegistry::never_registers()));
        manager.start(request("a", busybox()), None).await.unwrap();
        manager.start(request("b", busybox()), None).await.unwrap();
        gateway.fail_delete(GatewayError::api(500, "boom"));

        manager.shutdown().await;

        assert_eq!(gateway.deleted().len(), 2);
        assert!(manager.sessions.ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_of_same_id() {
        let manager = Arc::new(manager(
            running_gateway(),
            Arc::new(FakeRegistry::never_registers()),
        ));

        let first = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.start(request("a", busybox()), None).await }
        });
        let second = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.start(request("a", busybox()), None).await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(WorkerError::SessionExists(_)))));
    }

    #[tokio::test]
    async fn test_compile() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        let manifest = json!({"image": "busybox:latest"}).as_object().cloned().unwrap();

        let compiled = manager.compile(manifest, vec![json!({"name": "a.txt"})]).await.unwrap();

        assert_eq!(compiled.manifest["restart_policy"], "Never");
        assert_eq!(compiled.files.len(), 1);

        let unknown = json!({"type": "web-app"}).as_object().cloned().unwrap();
        assert!(matches!(
            manager.compile(unknown, vec![]).await,
            Err(WorkerError::Validation(_))
        ));
    }

    #[test]
    fn test_descriptor() {
        let manager = manager(running_gateway(), Arc::new(FakeRegistry::never_registers()));
        assert_eq!(
            manager.supported_types(),
            ["k8s-job", "claude-agent", "conda-worker"]
        );
        assert!(manager.description().contains("namespace default"));
        assert!(manager.require_context());
        assert!(manager.instance_id().starts_with("k8s-worker-"));
    }
}
