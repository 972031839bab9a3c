//! Scripted in-memory gateway used by the worker's tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ClusterGateway, ExecOutput, GatewayError, PodSummary};
use crate::workload::WorkloadSpec;

#[derive(Default)]
struct State {
    created: Vec<WorkloadSpec>,
    deleted: Vec<String>,
    list_calls: usize,
    /// Answers consumed one per `list_pods` call before falling back to `pods`
    scripted_pods: VecDeque<Result<Vec<PodSummary>, GatewayError>>,
    pods: Vec<PodSummary>,
    logs: HashMap<String, String>,
    log_error: Option<GatewayError>,
    create_error: Option<GatewayError>,
    delete_error: Option<GatewayError>,
    exec_result: Option<Result<ExecOutput, GatewayError>>,
    exec_delay: Option<Duration>,
    exec_calls: Vec<(String, String, Vec<String>)>,
}

/// A cluster that answers from a script
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<State>,
    /// Exec calls whose future was dropped before answering
    abandoned_execs: AtomicUsize,
}

/// Counts an exec as abandoned unless it is marked finished
struct PendingExec<'a> {
    abandoned: &'a AtomicUsize,
    finished: bool,
}

impl Drop for PendingExec<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steady-state answer of `list_pods`
    pub fn with_pods(self, pods: Vec<PodSummary>) -> Self {
        self.state.lock().unwrap().pods = pods;
        self
    }

    /// Queues one answer of `list_pods`
    pub fn push_pods(&self, answer: Result<Vec<PodSummary>, GatewayError>) {
        self.state.lock().unwrap().scripted_pods.push_back(answer);
    }

    pub fn set_logs(&self, pod: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(pod.to_string(), text.to_string());
    }

    pub fn fail_logs(&self, err: GatewayError) {
        self.state.lock().unwrap().log_error = Some(err);
    }

    pub fn fail_create(&self, err: GatewayError) {
        self.state.lock().unwrap().create_error = Some(err);
    }

    pub fn fail_delete(&self, err: GatewayError) {
        self.state.lock().unwrap().delete_error = Some(err);
    }

    pub fn set_exec(&self, result: Result<ExecOutput, GatewayError>) {
        self.state.lock().unwrap().exec_result = Some(result);
    }

    /// Makes every exec hang for `delay` before answering
    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = Some(delay);
    }

    pub fn created(&self) -> Vec<WorkloadSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn exec_calls(&self) -> Vec<(String, String, Vec<String>)> {
        self.state.lock().unwrap().exec_calls.clone()
    }

    pub fn abandoned_execs(&self) -> usize {
        self.abandoned_execs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterGateway for FakeGateway {
    async fn create_job(&self, spec: &WorkloadSpec) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        state.created.push(spec.clone());
        Ok(())
    }

    async fn list_pods(&self, _label_selector: &str) -> Result<Vec<PodSummary>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        match state.scripted_pods.pop_front() {
            Some(answer) => answer,
            None => Ok(state.pods.clone()),
        }
    }

    async fn delete_job(&self, job_name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(job_name.to_string());
        match state.delete_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pod_logs(&self, pod_name: &str, _container: &str) -> Result<String, GatewayError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = state.log_error.clone() {
            return Err(err);
        }
        Ok(state.logs.get(pod_name).cloned().unwrap_or_default())
    }

    async fn exec(
        &self,
        pod_name: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, GatewayError> {
        let (delay, result) = {
            let mut state = self.state.lock().unwrap();
            state
                .exec_calls
                .push((pod_name.to_string(), container.to_string(), command));
            (
                state.exec_delay,
                state.exec_result.clone().unwrap_or(Ok(ExecOutput::default())),
            )
        };

        let mut pending = PendingExec {
            abandoned: &self.abandoned_execs,
            finished: false,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        pending.finished = true;
        result
    }
}
