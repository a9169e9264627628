//! Single-slot publication of the latest encoded frame of a source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Latest JPEG of one source.
///
/// `publish` swaps in a new reference and `read` clones the current one out,
/// so the lock is held only for a pointer copy. A reader always observes one
/// complete previously published buffer or nothing.
#[derive(Debug, Default)]
pub struct FramePublisher {
    latest: Mutex<Option<Arc<[u8]>>>,
    published: AtomicU64,
}

impl FramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame. Last writer wins.
    pub fn publish(&self, bytes: impl Into<Arc<[u8]>>) {
        let bytes = bytes.into();
        let previous = {
            let mut slot = lock(&self.latest);
            slot.replace(bytes)
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        drop(previous);
    }

    pub fn read(&self) -> Option<Arc<[u8]>> {
        lock(&self.latest).clone()
    }

    /// Number of frames published since startup.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
