//! # Change detection for now-playing snapshots.
//!
//! [`StateTracker`] remembers the last snapshot that was actually announced and
//! compares every new snapshot against it, never against the previous frame of
//! the stream. Duplicate frames, including the replay that follows a reconnect,
//! therefore collapse into a single notification.
//!
//! ```text
//! snapshot ──► consider() ──► Unchanged ──► drop
//!                    └──────► Changed ──► notify ──► ok ──► acknowledge()
//!                                              └──► failed (last stays as is)
//! ```

use crate::types::Snapshot;

/// Outcome of [`StateTracker::consider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Changed,
    Unchanged,
}

/// Holds the last announced snapshot for one station.
#[derive(Debug, Default)]
pub struct StateTracker {
    last: Option<Snapshot>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `snapshot` with the last announced one. Never mutates.
    pub fn consider(&self, snapshot: &Snapshot) -> Verdict {
        match &self.last {
            Some(last) if last == snapshot => Verdict::Unchanged,
            _ => Verdict::Changed,
        }
    }

    /// Record `snapshot` as announced. Call only after a confirmed dispatch.
    pub fn acknowledge(&mut self, snapshot: Snapshot) {
        self.last = Some(snapshot);
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }
}
