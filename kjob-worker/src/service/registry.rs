//! Session registry
//!
//! Owns the session map and the workload-data map. Both live behind one lock
//! so they are always mutated together: a workload-data entry exists only for
//! a session whose startup succeeded.

use kjob_core::domain::session::{SessionInfo, SessionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::log_buffer::SessionLogs;
use crate::error::{Result, WorkerError};

/// Live workload handles of a started session
#[derive(Debug)]
pub struct SessionData {
    pub job_name: String,
    /// First pod observed for the job; not re-resolved if it is replaced
    pub pod_name: Option<String>,
    pub service_id: Option<String>,
    /// Container exec and log calls target by default
    pub container: String,
    /// Workload timeout in seconds
    pub timeout: u64,
    pub logs: Mutex<SessionLogs>,
}

#[derive(Default)]
struct Maps {
    sessions: HashMap<String, SessionInfo>,
    data: HashMap<String, Arc<SessionData>>,
}

/// In-memory store of sessions and their workload data
#[derive(Default)]
pub struct SessionRegistry {
    maps: RwLock<Maps>,
    /// Serialises start/stop per identifier
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of one session identifier
    pub async fn lock_id(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.id_locks.lock().await;
            locks.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the identifier lock once nobody else is queued on it
    ///
    /// Call while still holding the guard returned by [`Self::lock_id`].
    pub async fn release_id(&self, session_id: &str) {
        let mut locks = self.id_locks.lock().await;
        // one reference in the map, one in the caller's guard
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(session_id);
        }
    }

    /// Records a new session in STARTING
    pub async fn insert_starting(&self, info: SessionInfo) -> Result<()> {
        let mut maps = self.maps.write().await;
        if maps.sessions.contains_key(&info.session_id) {
            return Err(WorkerError::SessionExists(info.session_id));
        }
        maps.sessions.insert(info.session_id.clone(), info);
        Ok(())
    }

    /// Attaches workload data and flips the session to RUNNING
    pub async fn mark_running(&self, session_id: &str, data: SessionData) -> Result<()> {
        let mut maps = self.maps.write().await;
        let info = maps
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.to_string()))?;
        info.status = SessionStatus::Running;
        maps.data.insert(session_id.to_string(), Arc::new(data));
        Ok(())
    }

    /// Updates the status (and optionally the error) of a session
    pub async fn set_status(&self, session_id: &str, status: SessionStatus, error: Option<String>) {
        let mut maps = self.maps.write().await;
        if let Some(info) = maps.sessions.get_mut(session_id) {
            info.status = status;
            if error.is_some() {
                info.error = error;
            }
        }
    }

    /// Evicts a session and its workload data
    pub async fn remove(&self, session_id: &str) -> Option<SessionInfo> {
        let mut maps = self.maps.write().await;
        maps.data.remove(session_id);
        maps.sessions.remove(session_id)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.maps.read().await.sessions.contains_key(session_id)
    }

    /// Snapshot of one session
    pub async fn get(&self, session_id: &str) -> Result<SessionInfo> {
        self.maps
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.to_string()))
    }

    /// Workload data of a known session (`None` until startup succeeds)
    pub async fn data(&self, session_id: &str) -> Result<Option<Arc<SessionData>>> {
        let maps = self.maps.read().await;
        if !maps.sessions.contains_key(session_id) {
            return Err(WorkerError::SessionNotFound(session_id.to_string()));
        }
        Ok(maps.data.get(session_id).cloned())
    }

    /// Sessions of one workspace, oldest first
    pub async fn list(&self, workspace: &str) -> Vec<SessionInfo> {
        let maps = self.maps.read().await;
        let mut sessions: Vec<SessionInfo> = maps
            .sessions
            .values()
            .filter(|info| info.workspace == workspace)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    /// Identifiers of every tracked session
    pub async fn ids(&self) -> Vec<String> {
        self.maps.read().await.sessions.keys().cloned().collect()
    }

    /// Whether a session has workload data attached
    pub async fn has_data(&self, session_id: &str) -> bool {
        self.maps.read().await.data.contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kjob_core::domain::session::AppType;
    use serde_json::Map;
    use std::time::Duration;

    fn info(id: &str, workspace: &str) -> SessionInfo {
        SessionInfo {
            session_id: id.to_string(),
            app_id: "app".to_string(),
            workspace: workspace.to_string(),
            client_id: "client".to_string(),
            app_type: AppType::Job,
            status: SessionStatus::Starting,
            entry_point: None,
            created_at: chrono::Utc::now(),
            metadata: Map::new(),
            error: None,
        }
    }

    fn data() -> SessionData {
        SessionData {
            job_name: "hypha-job-a".to_string(),
            pod_name: Some("pod-a".to_string()),
            service_id: None,
            container: "main".to_string(),
            timeout: 3600,
            logs: Mutex::new(SessionLogs::new()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let registry = SessionRegistry::new();
        registry.insert_starting(info("a", "ws")).await.unwrap();
        registry.mark_running("a", data()).await.unwrap();

        let err = registry.insert_starting(info("a", "other")).await.unwrap_err();

        assert!(matches!(err, WorkerError::SessionExists(_)));
        let existing = registry.get("a").await.unwrap();
        assert_eq!(existing.workspace, "ws");
        assert_eq!(existing.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_remove_evicts_both_maps() {
        let registry = SessionRegistry::new();
        registry.insert_starting(info("a", "ws")).await.unwrap();
        registry.mark_running("a", data()).await.unwrap();
        assert!(registry.has_data("a").await);

        registry.remove("a").await;

        assert!(!registry.contains("a").await);
        assert!(!registry.has_data("a").await);
        assert!(matches!(
            registry.data("a").await,
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_data_absent_before_running() {
        let registry = SessionRegistry::new();
        registry.insert_starting(info("a", "ws")).await.unwrap();
        assert!(registry.data("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_workspace() {
        let registry = SessionRegistry::new();
        registry.insert_starting(info("a", "ws")).await.unwrap();
        registry.insert_starting(info("b", "other")).await.unwrap();
        registry.insert_starting(info("c", "ws")).await.unwrap();

        let ids: Vec<String> = registry
            .list("ws")
            .await
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"c".to_string()));
        assert!(registry.list("nobody").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_lock_serialises_same_identifier() {
        let registry = Arc::new(SessionRegistry::new());
        let guard = registry.lock_id("a").await;

        let other = Arc::clone(&registry);
        let waiter = tokio::spawn(async move {
            let _guard = other.lock_id("a").await;
        });

        // a different identifier is not blocked
        let _b = registry.lock_id("b").await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_id_drops_idle_locks() {
        let registry = SessionRegistry::new();
        let guard = registry.lock_id("a").await;
        registry.release_id("a").await;
        drop(guard);
        assert!(registry.id_locks.lock().await.is_empty());
    }
}
