//! Fixed registry of monitored sources.
//!
//! Built once at startup and never resized. Each entry owns the per-source
//! shared state: occupancy counts, the latest-frame slot and the loop status.
//! Entries never share a lock, so sources do not contend with each other.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::lot::LotState;
use crate::publish::FramePublisher;

/// Lifecycle of a source's processing loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Initializing,
    Running,
    Terminated,
}

impl SourceStatus {
    fn as_u8(self) -> u8 {
        match self {
            SourceStatus::Initializing => 0,
            SourceStatus::Running => 1,
            SourceStatus::Terminated => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SourceStatus::Initializing,
            1 => SourceStatus::Running,
            _ => SourceStatus::Terminated,
        }
    }
}

#[derive(Debug)]
pub struct SourceEntry {
    id: String,
    lot: LotState,
    frames: FramePublisher,
    status: AtomicU8,
}

impl SourceEntry {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            lot: LotState::new(capacity),
            frames: FramePublisher::new(),
            status: AtomicU8::new(SourceStatus::Initializing.as_u8()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lot(&self) -> &LotState {
        &self.lot
    }

    pub fn frames(&self) -> &FramePublisher {
        &self.frames
    }

    pub fn status(&self) -> SourceStatus {
        SourceStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: SourceStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

#[derive(Debug)]
pub struct SourceRegistry {
    entries: Vec<Arc<SourceEntry>>,
}

impl SourceRegistry {
    /// Freeze `entries` into a registry. Ids must be unique and non-empty.
    pub fn new(entries: Vec<SourceEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(anyhow!("source id must not be empty"));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(anyhow!("duplicate source id '{}'", entry.id));
            }
        }
        Ok(Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<SourceEntry>> {
        self.entries.iter().find(|entry| entry.id == id).cloned()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<SourceEntry>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_id() {
        let registry =
            SourceRegistry::new(vec![SourceEntry::new("1", 4), SourceEntry::new("2", 7)]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("2").unwrap().lot().capacity(), 7);
        assert!(registry.get("3").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn rejects_duplicate_and_empty_ids() {
        assert!(SourceRegistry::new(vec![SourceEntry::new("1", 1), SourceEntry::new("1", 2)]).is_err());
        assert!(SourceRegistry::new(vec![SourceEntry::new(" ", 1)]).is_err());
    }

    #[test]
    fn status_transitions_are_visible_across_handles() {
        let registry = SourceRegistry::new(vec![SourceEntry::new("1", 1)]).unwrap();
        let entry = registry.get("1").unwrap();
        assert_eq!(entry.status(), SourceStatus::Initializing);
        entry.set_status(SourceStatus::Running);
        assert_eq!(registry.get("1").unwrap().status(), SourceStatus::Running);
    }
}
