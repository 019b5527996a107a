//! External control signals (hotkeys, UI buttons)
//!
//! Signals arrive on a channel and are applied to the run token and the
//! recording switch; they never reach executor or detector internals.

use std::sync::Arc;

use parking_lot::Mutex;
use pattern_detector::ObservationLog;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Cancel the active action or replay
    Cancel,
    /// Pause or resume observation recording
    ToggleRecording,
}

/// Cancellation token of the current run
///
/// A cancelled token is replaced on the next [`RunTokens::current`] call, so
/// one cancel stops one run.
#[derive(Debug, Clone, Default)]
pub struct RunTokens {
    inner: Arc<Mutex<CancellationToken>>,
}

impl RunTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> CancellationToken {
        let mut token = self.inner.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    pub fn cancel(&self) {
        self.inner.lock().cancel();
    }
}

/// Applies [`ControlSignal`]s
#[derive(Clone)]
pub struct SignalRouter {
    tokens: RunTokens,
    log: Arc<ObservationLog>,
}

impl SignalRouter {
    pub fn new(tokens: RunTokens, log: Arc<ObservationLog>) -> Self {
        Self { tokens, log }
    }

    pub fn apply(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::Cancel => {
                info!("Cancel signal received");
                self.tokens.cancel();
            }
            ControlSignal::ToggleRecording => {
                let recording = self.log.toggle_recording();
                info!(recording, "Recording toggled by signal");
            }
        }
    }

    /// Consume signals until every sender is dropped
    pub fn spawn(self, mut rx: mpsc::Receiver<ControlSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                self.apply(signal);
            }
            debug!("Signal channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_affects_one_run() {
        let tokens = RunTokens::new();
        let first = tokens.current();
        let router = SignalRouter::new(tokens.clone(), Arc::new(ObservationLog::new(10)));

        router.apply(ControlSignal::Cancel);
        assert!(first.is_cancelled());
        assert!(!tokens.current().is_cancelled());
    }

    #[tokio::test]
    async fn test_router_task_toggles_recording() {
        let log = Arc::new(ObservationLog::new(10));
        let router = SignalRouter::new(RunTokens::new(), log.clone());
        let (tx, rx) = mpsc::channel(4);
        let handle = router.spawn(rx);

        tx.send(ControlSignal::ToggleRecording).await.unwrap();
        drop(tx);
        handle.await.unwrap();
        assert!(!log.is_recording());
    }
}
