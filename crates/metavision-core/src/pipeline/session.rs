//! Generation-guarded ownership of the current record.
//!
//! Each run takes a [`RunTicket`] before it starts. Starting another run or
//! resetting bumps the latest generation, so a slow run that finishes late
//! is turned away at commit time instead of overwriting newer output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::MetadataRecord;

/// Proof that a run was started at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    generation: u64,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct SessionInner {
    latest: AtomicU64,
    current: Mutex<Option<Arc<MetadataRecord>>>,
}

/// Holds the record currently shown to consumers.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run, superseding any run still in flight.
    pub fn begin(&self) -> RunTicket {
        let generation = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RunTicket { generation }
    }

    /// Whether `ticket` belongs to the most recently started run.
    pub fn is_current(&self, ticket: RunTicket) -> bool {
        self.inner.latest.load(Ordering::SeqCst) == ticket.generation
    }

    /// Publish a finished record.
    ///
    /// Returns `false` and drops the record (releasing its preview) if a newer
    /// run has started since `ticket` was issued.
    pub fn commit(&self, ticket: RunTicket, mut record: MetadataRecord) -> bool {
        let Ok(mut current) = self.inner.current.lock() else {
            return false;
        };
        // Checked under the lock so a concurrent reset can't slip in between
        if !self.is_current(ticket) {
            tracing::debug!(
                "Discarding stale record from generation {}",
                ticket.generation
            );
            return false;
        }
        record.generation = ticket.generation;
        *current = Some(Arc::new(record));
        true
    }

    /// The latest committed record.
    pub fn current(&self) -> Option<Arc<MetadataRecord>> {
        self.inner.current.lock().ok()?.clone()
    }

    /// Clear the current record and supersede any in-flight run.
    pub fn reset(&self) {
        self.inner.latest.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.inner.current.lock() {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preview::PreviewRegistry;

    #[test]
    fn test_commit_latest_run() {
        let session = Session::new();
        let ticket = session.begin();
        assert!(session.commit(ticket, MetadataRecord::default()));
        assert_eq!(session.current().unwrap().generation, ticket.generation());
    }

    #[test]
    fn test_stale_commit_rejected() {
        let session = Session::new();
        let first = session.begin();
        let second = session.begin();

        assert!(session.commit(second, MetadataRecord::default()));
        assert!(!session.commit(first, MetadataRecord::default()));
        assert_eq!(session.current().unwrap().generation, second.generation());
    }

    #[test]
    fn test_reset_releases_preview_and_supersedes() {
        let registry = PreviewRegistry::new();
        let session = Session::new();
        let ticket = session.begin();
        let record = MetadataRecord {
            preview: Some(registry.register(vec![1, 2, 3])),
            ..MetadataRecord::default()
        };
        assert!(session.commit(ticket, record));
        assert_eq!(registry.live_count(), 1);

        let in_flight = session.begin();
        session.reset();
        assert!(session.current().is_none());
        assert_eq!(registry.live_count(), 0);
        assert!(!session.commit(in_flight, MetadataRecord::default()));
    }

    #[test]
    fn test_replacement_releases_old_preview_once() {
        let registry = PreviewRegistry::new();
        let session = Session::new();

        let first = MetadataRecord {
            preview: Some(registry.register(vec![1])),
            ..MetadataRecord::default()
        };
        assert!(session.commit(session.begin(), first));

        let second = MetadataRecord {
            preview: Some(registry.register(vec![2])),
            ..MetadataRecord::default()
        };
        assert!(session.commit(session.begin(), second));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_rejected_record_releases_its_preview() {
        let registry = PreviewRegistry::new();
        let session = Session::new();
        let stale = session.begin();
        session.begin();

        let record = MetadataRecord {
            preview: Some(registry.register(vec![9])),
            ..MetadataRecord::default()
        };
        assert!(!session.commit(stale, record));
        assert_eq!(registry.live_count(), 0);
    }
}
