//! Session log buffers
//!
//! Each session keeps five append-only buffers (`stdout`, `stderr`, `info`,
//! `error`, `progress`). Container output fetched from the cluster is merged
//! into `stdout` incrementally, so repeated fetches never duplicate lines.

use kjob_core::domain::log::{LogItem, LogKind};
use kjob_core::dto::log::{LogPage, LogQuery};

/// Structured log buffers of one session
#[derive(Debug, Default, Clone)]
pub struct SessionLogs {
    stdout: Vec<String>,
    stderr: Vec<String>,
    info: Vec<String>,
    error: Vec<String>,
    progress: Vec<String>,
    /// Bytes of container output already copied into `stdout`
    live_cursor: usize,
}

impl SessionLogs {
    /// Creates empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self, kind: LogKind) -> &Vec<String> {
        match kind {
            LogKind::Stdout => &self.stdout,
            LogKind::Stderr => &self.stderr,
            LogKind::Info => &self.info,
            LogKind::Error => &self.error,
            LogKind::Progress => &self.progress,
        }
    }

    fn buffer_mut(&mut self, kind: LogKind) -> &mut Vec<String> {
        match kind {
            LogKind::Stdout => &mut self.stdout,
            LogKind::Stderr => &mut self.stderr,
            LogKind::Info => &mut self.info,
            LogKind::Error => &mut self.error,
            LogKind::Progress => &mut self.progress,
        }
    }

    /// Appends one entry
    ///
    /// # Arguments
    /// * `kind` - Buffer to append to
    /// * `content` - The entry
    pub fn push(&mut self, kind: LogKind, content: impl Into<String>) {
        self.buffer_mut(kind).push(content.into());
    }

    /// Entries of one buffer, oldest first
    pub fn entries(&self, kind: LogKind) -> &[String] {
        self.buffer(kind)
    }

    /// Merges the container's full current output into `stdout`
    ///
    /// Only the part past the last ingested byte is appended. A shorter output
    /// than before means the container restarted; it is then appended whole
    /// and the cursor starts over.
    pub fn ingest_live(&mut self, full_output: &str) {
        let fresh = if full_output.len() >= self.live_cursor
            && full_output.is_char_boundary(self.live_cursor)
        {
            &full_output[self.live_cursor..]
        } else {
            full_output
        };

        if !fresh.is_empty() {
            self.stdout.push(fresh.to_string());
        }
        self.live_cursor = full_output.len();
    }

    /// Flattens, filters and paginates the buffers
    ///
    /// Items are ordered by buffer (`stdout`, `stderr`, `info`, `error`,
    /// `progress`) and by insertion within a buffer. `total` counts the
    /// filtered items before pagination. An unknown type matches nothing.
    pub fn page(&self, query: &LogQuery) -> LogPage {
        let kinds: Vec<LogKind> = match query.kind.as_deref() {
            None => LogKind::ALL.to_vec(),
            Some(name) => LogKind::ALL
                .into_iter()
                .filter(|kind| kind.as_str() == name)
                .collect(),
        };

        let filtered: Vec<LogItem> = kinds
            .into_iter()
            .flat_map(|kind| {
                self.buffer(kind).iter().map(move |content| LogItem {
                    kind,
                    content: content.clone(),
                })
            })
            .collect();

        let total = filtered.len();
        let items = filtered
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        LogPage {
            items,
            total,
            offset: query.offset,
            limit: query.limit,
        }
    }
}
