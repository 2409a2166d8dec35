//! Snapshottable counters exposed by the Service Facade.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    pub bytes_transferred: AtomicU64,
    pub connections_accepted: AtomicU64,
    pub connections_refused: AtomicU64,
    pub connections_failed: AtomicU64,
    pub connections_closed: AtomicU64,
    pub pauses: AtomicU64,
    pub resumes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_transferred: u64,
    pub connections_accepted: u64,
    pub connections_refused: u64,
    pub connections_failed: u64,
    pub connections_closed: u64,
    pub pauses: u64,
    pub resumes: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            pauses: self.pauses.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
        }
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_paused(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resumed(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = Stats::default();
        stats.add_bytes(42);
        stats.inc_accepted();
        stats.inc_accepted();
        stats.inc_refused();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_transferred, 42);
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.connections_refused, 1);
    }
}
