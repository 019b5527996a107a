//! Repeated-sequence detection over the observation log

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use action_executor::Observation;
use action_primitives::Action;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::errors::DetectorError;
use crate::log::ObservationLog;
use crate::normalize::{covered_by, is_detectable, is_periodic, normalize, NormalizedAction};
use crate::promote::{promote, PromotedWorkflow};

/// A repeated, not yet confirmed action sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    pub sequence: Vec<NormalizedAction>,

    /// Non-overlapping occurrences seen so far (2 on first detection)
    pub occurrence_count: u32,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,

    /// Concrete actions of the most recent occurrence
    pub latest: Vec<Action>,
}

impl PatternCandidate {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// One-line description, e.g. `fill label:'Email' -> click text:'Save'`
    pub fn describe(&self) -> String {
        self.sequence
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

type PatternCallback = Arc<dyn Fn(&PatternCandidate) + Send + Sync>;

struct Entry {
    key: Option<NormalizedAction>,
    observation: Observation,
}

struct Tracked {
    candidate: PatternCandidate,
    /// Absolute position of the last counted occurrence's final action
    last_end: usize,
}

#[derive(Default)]
struct DetectorState {
    window: VecDeque<Entry>,
    /// Absolute position of `window[0]`
    base: usize,
    last_seq: u64,
    candidates: Vec<Tracked>,
    notified: HashSet<Vec<NormalizedAction>>,
}

impl DetectorState {
    /// Add one detectable observation; returns a candidate on its first detection
    fn push(&mut self, observation: Observation, config: &DetectorConfig) -> Option<PatternCandidate> {
        let key = normalize(&observation);
        if self.window.len() >= config.window_size {
            self.window.pop_front();
            self.base += 1;
        }
        self.window.push_back(Entry { key, observation });
        let end = self.base + self.window.len() - 1;

        for len in (config.min_len..=config.max_len).rev() {
            if len > self.window.len() {
                continue;
            }
            let start = end + 1 - len;
            let Some(sequence) = self.keys(start, len) else {
                continue;
            };
            if is_periodic(&sequence) {
                continue;
            }

            if let Some(index) = self
                .candidates
                .iter()
                .position(|t| t.candidate.sequence == sequence)
            {
                if start > self.candidates[index].last_end {
                    let latest = self.actions(start, len);
                    let last_seen_at = self.timestamp(end);
                    let tracked = &mut self.candidates[index];
                    tracked.candidate.occurrence_count += 1;
                    tracked.candidate.last_seen_at = last_seen_at;
                    tracked.candidate.latest = latest;
                    tracked.last_end = end;
                    debug!(
                        pattern = %tracked.candidate.describe(),
                        occurrences = tracked.candidate.occurrence_count,
                        "Pattern repeated"
                    );
                }
                return None;
            }

            if self
                .candidates
                .iter()
                .any(|t| covered_by(&sequence, &t.candidate.sequence))
            {
                continue;
            }

            let earlier = self.earlier_occurrences(&sequence, start);
            let Some(&first) = earlier.first() else {
                continue;
            };

            let candidate = PatternCandidate {
                sequence: sequence.clone(),
                occurrence_count: earlier.len() as u32 + 1,
                first_seen_at: self.timestamp(first),
                last_seen_at: self.timestamp(end),
                latest: self.actions(start, len),
            };
            self.candidates.retain(|t| {
                !(t.candidate.len() < len && covered_by(&t.candidate.sequence, &sequence))
            });
            self.candidates.push(Tracked {
                candidate: candidate.clone(),
                last_end: end,
            });

            return self.notified.insert(sequence).then_some(candidate);
        }
        None
    }

    fn entry(&self, position: usize) -> &Entry {
        &self.window[position - self.base]
    }

    fn keys(&self, start: usize, len: usize) -> Option<Vec<NormalizedAction>> {
        (start..start + len)
            .map(|p| self.entry(p).key.clone())
            .collect()
    }

    fn actions(&self, start: usize, len: usize) -> Vec<Action> {
        (start..start + len)
            .map(|p| self.entry(p).observation.action.clone())
            .collect()
    }

    fn timestamp(&self, position: usize) -> DateTime<Utc> {
        self.entry(position).observation.timestamp
    }

    /// Non-overlapping starts of `sequence` ending before `before`
    fn earlier_occurrences(&self, sequence: &[NormalizedAction], before: usize) -> Vec<usize> {
        let len = sequence.len();
        let mut found = Vec::new();
        let mut p = self.base;
        while p + len <= before {
            let matches = (0..len).all(|i| self.entry(p + i).key.as_ref() == Some(&sequence[i]));
            if matches {
                found.push(p);
                p += len;
            } else {
                p += 1;
            }
        }
        found
    }
}

/// Watches the observation log for repeated action sequences
///
/// Each normalized sequence is reported once per session, the first time a
/// second occurrence is seen. Candidates live until they are confirmed or
/// the session ends.
pub struct PatternDetector {
    config: DetectorConfig,
    log: Arc<ObservationLog>,
    state: Mutex<DetectorState>,
    callbacks: RwLock<Vec<PatternCallback>>,
}

impl PatternDetector {
    pub fn new(config: DetectorConfig, log: Arc<ObservationLog>) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            config,
            log,
            state: Mutex::new(DetectorState::default()),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<ObservationLog> {
        &self.log
    }

    /// Register a callback invoked once per newly detected pattern
    pub fn on_pattern_detected<F>(&self, callback: F)
    where
        F: Fn(&PatternCandidate) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Process observations appended since the previous scan
    ///
    /// Returns the candidates detected for the first time by this scan.
    pub fn scan(&self) -> Vec<PatternCandidate> {
        let since = self.state.lock().last_seq;
        let observations = self.log.since(since);
        if observations.is_empty() {
            return Vec::new();
        }

        let mut emitted = Vec::new();
        {
            let mut state = self.state.lock();
            for observation in observations {
                if observation.seq <= state.last_seq {
                    continue;
                }
                state.last_seq = observation.seq;
                if !is_detectable(&observation) {
                    continue;
                }
                if let Some(candidate) = state.push(observation, &self.config) {
                    emitted.push(candidate);
                }
            }
        }

        if !emitted.is_empty() {
            let callbacks: Vec<PatternCallback> = self.callbacks.read().clone();
            for candidate in &emitted {
                info!(
                    pattern = %candidate.describe(),
                    length = candidate.len(),
                    occurrences = candidate.occurrence_count,
                    "Repeated pattern detected"
                );
                for callback in &callbacks {
                    callback(candidate);
                }
            }
        }
        emitted
    }

    /// Active candidates, longest first
    pub fn candidates(&self) -> Vec<PatternCandidate> {
        let mut candidates: Vec<PatternCandidate> = self
            .state
            .lock()
            .candidates
            .iter()
            .map(|t| t.candidate.clone())
            .collect();
        candidates.sort_by(|a, b| {
            b.len()
                .cmp(&a.len())
                .then(b.occurrence_count.cmp(&a.occurrence_count))
        });
        candidates
    }

    /// Promote a candidate into a workflow and stop tracking it
    pub fn confirm(
        &self,
        sequence: &[NormalizedAction],
        name: &str,
    ) -> Result<PromotedWorkflow, DetectorError> {
        let candidate = {
            let mut state = self.state.lock();
            let index = state
                .candidates
                .iter()
                .position(|t| t.candidate.sequence == sequence)
                .ok_or_else(|| {
                    DetectorError::UnknownCandidate(
                        sequence
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(" -> "),
                    )
                })?;
            state.candidates.remove(index).candidate
        };
        promote(&candidate, name)
    }

    /// Discard unconfirmed candidates and forget what was notified
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        let discarded = state.candidates.len();
        let last_seq = state.last_seq;
        let base = state.base + state.window.len();
        *state = DetectorState {
            last_seq,
            base,
            ..Default::default()
        };
        info!(discarded, "Detector session ended");
    }

    /// Scan on a timer until `cancel` fires
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let detector = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        detector.scan();
                    }
                }
            }
            debug!("Periodic pattern scan stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::observation;
    use action_executor::AttemptOutcome;
    use action_primitives::{FailureKind, TargetSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn a(value: &str) -> Observation {
        observation(Action::fill(TargetSpec::label("Email"), value))
    }

    fn b() -> Observation {
        observation(Action::click(TargetSpec::text("Save")))
    }

    fn c() -> Observation {
        observation(Action::click(TargetSpec::css("#next")))
    }

    fn detector() -> (Arc<ObservationLog>, PatternDetector) {
        let log = Arc::new(ObservationLog::new(50));
        let detector = PatternDetector::new(DetectorConfig::default(), log.clone()).unwrap();
        (log, detector)
    }

    #[test]
    fn test_emits_after_fourth_observation() {
        let (log, detector) = detector();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        detector.on_pattern_detected(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for observation in [a("one"), b(), a("two")] {
            log.append(observation);
            assert!(detector.scan().is_empty());
        }
        log.append(b());
        let emitted = detector.scan();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), 2);
        assert_eq!(emitted[0].occurrence_count, 2);
        assert_eq!(emitted[0].latest[0].payload.as_deref(), Some("two"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeats_increment_without_renotifying() {
        let (log, detector) = detector();
        for value in ["1", "2", "3"] {
            log.append(a(value));
            log.append(b());
        }
        let emitted = detector.scan();
        assert_eq!(emitted.len(), 1);

        let candidates = detector.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].occurrence_count, 3);
        assert_eq!(candidates[0].latest[0].payload.as_deref(), Some("3"));
    }

    #[test]
    fn test_longer_sequence_supersedes_shorter() {
        let (log, detector) = detector();
        for value in ["1", "2"] {
            log.append(a(value));
            log.append(b());
            log.append(c());
        }
        detector.scan();
        let candidates = detector.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].len(), 3);
    }

    #[test]
    fn test_failed_attempts_are_ignored() {
        let (log, detector) = detector();
        let mut failed = c();
        failed.outcome = AttemptOutcome::Failure {
            kind: FailureKind::NotReady,
            message: "moving".into(),
        };
        for observation in [a("1"), failed.clone(), b(), a("2"), failed, b()] {
            log.append(observation);
        }
        let emitted = detector.scan();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), 2);
    }

    #[test]
    fn test_single_action_repeat_is_not_a_pattern() {
        let (log, detector) = detector();
        for _ in 0..6 {
            log.append(b());
        }
        assert!(detector.scan().is_empty());
    }

    #[test]
    fn test_end_session_discards_and_rearms() {
        let (log, detector) = detector();
        for value in ["1", "2"] {
            log.append(a(value));
            log.append(b());
        }
        assert_eq!(detector.scan().len(), 1);

        detector.end_session();
        assert!(detector.candidates().is_empty());

        for value in ["3", "4"] {
            log.append(a(value));
            log.append(b());
        }
        assert_eq!(detector.scan().len(), 1);
    }

    #[test]
    fn test_confirm_removes_candidate() {
        let (log, detector) = detector();
        for value in ["1", "2"] {
            log.append(a(value));
            log.append(b());
        }
        let candidate = detector.scan().remove(0);
        let promoted = detector.confirm(&candidate.sequence, "save-email").unwrap();
        assert_eq!(promoted.workflow.steps.len(), 2);
        assert!(detector.candidates().is_empty());
        assert!(matches!(
            detector.confirm(&candidate.sequence, "again"),
            Err(DetectorError::UnknownCandidate(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_scan_stops_on_cancel() {
        let (log, detector) = detector();
        let detector = Arc::new(detector);
        let cancel = CancellationToken::new();
        let handle = detector.spawn_periodic(Duration::from_millis(100), cancel.clone());

        for value in ["1", "2"] {
            log.append(a(value));
            log.append(b());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(detector.candidates().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
