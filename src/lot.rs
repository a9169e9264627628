//! Per-source occupancy counts and the bounded history window.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Maximum number of history entries retained per source.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Local wall-clock time of day, `HH:MM:SS`.
    pub time: String,
    pub available: usize,
    pub occupied: usize,
}

/// Live counts without history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LotCounts {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
}

/// Counts plus history, copied out under the lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LotSnapshot {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug)]
struct LotInner {
    available: usize,
    occupied: usize,
    history: VecDeque<HistoryEntry>,
}

/// Occupancy state of one source.
///
/// Written only by the owning processing loop, read by the API. Capacity is
/// fixed at construction and `available + occupied == capacity` holds at all
/// times; every region counts as available until the first update.
#[derive(Debug)]
pub struct LotState {
    capacity: usize,
    inner: Mutex<LotInner>,
}

impl LotState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LotInner {
                available: capacity,
                occupied: 0,
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the counts and append a history entry, evicting the oldest
    /// entry once the window is full.
    pub fn record(&self, occupied: usize, time: String) -> Result<HistoryEntry> {
        if occupied > self.capacity {
            return Err(anyhow!(
                "occupied count {} exceeds capacity {}",
                occupied,
                self.capacity
            ));
        }
        let entry = HistoryEntry {
            time,
            available: self.capacity - occupied,
            occupied,
        };
        let mut inner = self.lock();
        inner.available = entry.available;
        inner.occupied = entry.occupied;
        while inner.history.len() >= HISTORY_CAPACITY {
            inner.history.pop_front();
        }
        inner.history.push_back(entry.clone());
        Ok(entry)
    }

    pub fn counts(&self) -> LotCounts {
        let inner = self.lock();
        LotCounts {
            total: self.capacity,
            available: inner.available,
            occupied: inner.occupied,
        }
    }

    pub fn snapshot(&self) -> LotSnapshot {
        let inner = self.lock();
        LotSnapshot {
            total: self.capacity,
            available: inner.available,
            occupied: inner.occupied,
            history: inner.history.iter().cloned().collect(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    // Poisoning is ignored: the guarded data is plain counters.
    fn lock(&self) -> MutexGuard<'_, LotInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
