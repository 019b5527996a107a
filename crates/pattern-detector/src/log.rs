//! Bounded, append-only observation log

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use action_executor::{Observation, ObservationSink};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const STREAM_CAPACITY: usize = 256;

/// Recent observations in arrival order
///
/// Appends take the write lock, so a reader sees an observation entirely or
/// not at all. Once `capacity` is exceeded the oldest entry is evicted.
pub struct ObservationLog {
    capacity: usize,
    entries: RwLock<VecDeque<Observation>>,
    next_seq: AtomicU64,
    recording: AtomicBool,
    sender: broadcast::Sender<Observation>,
}

impl ObservationLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
            next_seq: AtomicU64::new(1),
            recording: AtomicBool::new(true),
            sender,
        }
    }

    /// Append an observation, assigning its sequence number
    ///
    /// Returns the assigned sequence, or `None` while recording is paused.
    pub fn append(&self, mut observation: Observation) -> Option<u64> {
        if !self.is_recording() {
            trace!(action_id = %observation.action_id, "Recording paused, observation dropped");
            return None;
        }

        let seq = {
            let mut entries = self.entries.write();
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            observation.seq = seq;
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(observation.clone());
            seq
        };

        // No subscribers is fine
        let _ = self.sender.send(observation);
        Some(seq)
    }

    /// Live stream of appended observations
    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.sender.subscribe()
    }

    /// Consistent copy of the retained window
    pub fn snapshot(&self) -> Vec<Observation> {
        self.entries.read().iter().cloned().collect()
    }

    /// Retained observations with a sequence greater than `seq`
    pub fn since(&self, seq: u64) -> Vec<Observation> {
        self.entries
            .read()
            .iter()
            .filter(|o| o.seq > seq)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::SeqCst);
        debug!(recording = on, "Observation recording switched");
    }

    /// Flip the recording switch, returning the new state
    pub fn toggle_recording(&self) -> bool {
        let now = !self.recording.fetch_xor(true, Ordering::SeqCst);
        debug!(recording = now, "Observation recording toggled");
        now
    }
}

impl Default for ObservationLog {
    fn default() -> Self {
        Self::new(crate::DetectorConfig::default().window_size)
    }
}

impl ObservationSink for ObservationLog {
    fn record(&self, observation: Observation) {
        self.append(observation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::observation;
    use action_primitives::{Action, TargetSpec};

    fn click(text: &str) -> Observation {
        observation(Action::click(TargetSpec::text(text)))
    }

    #[test]
    fn test_append_assigns_sequence_and_evicts() {
        let log = ObservationLog::new(3);
        for text in ["a", "b", "c", "d"] {
            log.append(click(text));
        }
        let seqs: Vec<u64> = log.snapshot().iter().map(|o| o.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(log.since(3).len(), 1);
    }

    #[test]
    fn test_recording_switch() {
        let log = ObservationLog::new(10);
        assert!(!log.toggle_recording());
        assert_eq!(log.append(click("a")), None);
        assert!(log.is_empty());

        assert!(log.toggle_recording());
        assert_eq!(log.append(click("a")), Some(1));
    }

    #[test]
    fn test_subscribers_receive_appends() {
        let log = ObservationLog::new(10);
        let mut rx = log.subscribe();
        log.record(click("a"));
        let received = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(received.seq, 1);
    }
}
