//! Progress delivery
//!
//! Callers may attach a [`ProgressSink`] to long-running operations. Delivery
//! is best-effort: a failing or absent sink never aborts the operation.

use async_trait::async_trait;
use kjob_core::domain::progress::ProgressEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiver of progress events
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    async fn emit(&self, event: ProgressEvent) -> anyhow::Result<()> {
        self.send(event)
            .map_err(|e| anyhow::anyhow!("progress receiver dropped: {}", e))
    }
}

/// Delivers an event, logging instead of failing
pub async fn emit_safely(sink: Option<&Arc<dyn ProgressSink>>, event: ProgressEvent) {
    if let Some(sink) = sink {
        if let Err(e) = sink.emit(event).await {
            warn!("Failed to deliver progress event: {:#}", e);
        }
    }
}

/// Progress reporter of one session start
///
/// Forwards events to the caller's sink and keeps a journal of
/// `"<TYPE>: <message>"` lines for the session's `progress` log.
pub struct StartupReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    journal: Vec<String>,
}

impl StartupReporter {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            journal: Vec::new(),
        }
    }

    pub async fn report(&mut self, event: ProgressEvent) {
        self.journal.push(event.journal_line());
        emit_safely(self.sink.as_ref(), event).await;
    }

    pub fn into_journal(self) -> Vec<String> {
        self.journal
    }
}
