//! Connection handle: one physical connection plus its pool metadata.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Wraps one raw connection with identity, timestamps, and the advisory
/// suspect flag.
///
/// The raw connection lives behind `Mutex<Option<C>>`: taking it out is the
/// only way it leaves, so it can be closed at most once. The handle is
/// shared (via `Arc`) between the pool registry and at most one live lease.
pub struct ConnectionHandle<C> {
    id: u64,
    created_at: Instant,
    last_used: Mutex<Instant>,
    suspect: AtomicBool,
    raw: Mutex<Option<C>>,
}

impl<C> ConnectionHandle<C> {
    pub(crate) fn new(id: u64, raw: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used: Mutex::new(now),
            suspect: AtomicBool::new(false),
            raw: Mutex::new(Some(raw)),
        }
    }

    /// Stable identifier, unique within the pool's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    pub fn seconds_since_last_used(&self) -> u64 {
        self.last_used.lock().elapsed().as_secs()
    }

    pub fn seconds_since_created(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// Set last-used to the current steady-clock time.
    pub fn update_last_used(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Advisory hint set by the health-check worker: the last probe
    /// failed, revalidate before trusting. Validation on lease is
    /// authoritative.
    pub fn mark_suspect(&self) {
        self.suspect.store(true, Ordering::SeqCst);
    }

    pub fn clear_suspect(&self) {
        self.suspect.store(false, Ordering::SeqCst);
    }

    pub fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::SeqCst)
    }

    pub(crate) fn raw(&self) -> &Mutex<Option<C>> {
        &self.raw
    }

    /// Remove the raw connection. Returns `None` if it was already taken.
    pub(crate) fn take_raw(&self) -> Option<C> {
        self.raw.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_suspect_flag_toggle() {
        let handle = ConnectionHandle::new(1, ());
        assert!(!handle.is_suspect());

        handle.mark_suspect();
        assert!(handle.is_suspect());

        handle.clear_suspect();
        assert!(!handle.is_suspect());
    }

    #[test]
    fn test_update_last_used_advances() {
        let handle = ConnectionHandle::new(2, ());
        let first = handle.last_used();

        std::thread::sleep(Duration::from_millis(10));
        handle.update_last_used();

        assert!(handle.last_used() > first);
        assert_eq!(handle.seconds_since_last_used(), 0);
    }

    #[test]
    fn test_take_raw_is_exactly_once() {
        let handle = ConnectionHandle::new(3, "conn");
        assert_eq!(handle.take_raw(), Some("conn"));
        assert_eq!(handle.take_raw(), None);
    }
}
