//! Log DTOs

use serde::{Deserialize, Serialize};

use crate::domain::log::LogItem;

/// Paging and filtering parameters for `get_logs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Only return entries of this type (`stdout`, `stderr`, `info`, ...)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub offset: usize,
    /// Absent means "to the end"
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One page of session logs
///
/// `total` counts entries after type filtering and before paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub items: Vec<LogItem>,
    pub total: usize,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl LogPage {
    pub fn empty(query: &LogQuery) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset: query.offset,
            limit: query.limit,
        }
    }
}
