//! Stream policy sources for the priority table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use focusd_core::{Error, Result, StreamPolicySource};
use serde::Deserialize;

use crate::config::PolicyConfig;

/// Priorities listed inline in the daemon config.
pub struct InlinePolicy {
    priorities: BTreeMap<String, i32>,
}

impl InlinePolicy {
    #[must_use]
    pub fn new(priorities: BTreeMap<String, i32>) -> Self {
        Self { priorities }
    }
}

impl StreamPolicySource for InlinePolicy {
    fn fetch_stream_priorities(&self) -> Result<Vec<(String, i32)>> {
        let mut entries: Vec<_> =
            self.priorities.iter().map(|(name, priority)| (name.clone(), *priority)).collect();
        entries.sort_by_key(|(_, priority)| *priority);
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct StreamMap {
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    role: String,
    priority: i32,
}

/// A JSON stream-map file: `{"streams": [{"role": "...", "priority": N}]}`.
pub struct StreamMapFile {
    path: PathBuf,
}

impl StreamMapFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StreamPolicySource for StreamMapFile {
    fn fetch_stream_priorities(&self) -> Result<Vec<(String, i32)>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Internal(format!("Failed to read stream map {}: {e}", self.path.display()))
        })?;
        let map: StreamMap = serde_json::from_str(&content)?;
        Ok(map.streams.into_iter().map(|s| (s.role, s.priority)).collect())
    }
}

/// Pick the policy source the config asks for.
#[must_use]
pub fn source_from_config(config: &PolicyConfig) -> Box<dyn StreamPolicySource> {
    match &config.stream_map {
        Some(path) => Box::new(StreamMapFile::new(path)),
        None => Box::new(InlinePolicy::new(config.priorities.clone())),
    }
}
