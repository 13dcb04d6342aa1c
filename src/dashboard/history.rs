//! The bounded snapshot replay ring.
//!
//! Fixed-capacity from construction: append-on-tick, and once full,
//! shift left by one and overwrite the last slot in the existing
//! backing `Vec` so capacity never grows and old entries are dropped in
//! place rather than sliced off the front (slicing would retain the
//! underlying allocation and leak old snapshots).

use crate::snapshot::Snapshot;

pub struct SnapshotHistory {
    buf: Vec<Snapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() < self.capacity {
            self.buf.push(snapshot);
        } else {
            self.buf.rotate_left(1);
            let last = self.buf.len() - 1;
            self.buf[last] = snapshot;
        }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snap(base: chrono::DateTime<Utc>, n: i64) -> Snapshot {
        Snapshot {
            kind: "snapshot",
            timestamp: base + chrono::Duration::seconds(n),
            departments: BTreeMap::new(),
        }
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_backing_array_fixed() {
        let base = Utc::now();
        let mut history = SnapshotHistory::new(300);
        for i in 0..1000 {
            history.push(snap(base, i));
        }
        assert_eq!(history.snapshots().len(), 300);
        assert_eq!(history.capacity(), 300);
    }

    #[test]
    fn keeps_last_n_in_arrival_order() {
        let base = Utc::now();
        let mut history = SnapshotHistory::new(300);
        for i in 0..500 {
            history.push(snap(base, i));
        }
        let snaps = history.snapshots();
        assert_eq!(snaps.len(), 300);
        // the oldest surviving entry should be index 200 (500 - 300)
        assert_eq!(snaps[0].timestamp, snap(base, 200).timestamp);
        assert_eq!(snaps[299].timestamp, snap(base, 499).timestamp);
    }
}
