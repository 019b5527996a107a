//! One automation session against a single page
//!
//! Wires the executor, observation log, detector, workflow store and replay
//! engine together and exposes the engine's external surface.

use std::sync::Arc;

use action_executor::{ActionExecutor, Observation, Outcome};
use action_flow::{
    FlowError, FlowExecutor, ReplayEngine, RunReport, VariableBindings, VariableProvider,
    Workflow, WorkflowStore,
};
use action_primitives::{Action, Clock, DriverError, PageDriver, PageInfo, TokioClock};
use pagewright_core_types::{SessionId, WorkflowId};
use pattern_detector::{
    NormalizedAction, ObservationLog, PatternCandidate, PatternDetector, PromotedWorkflow,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::errors::SessionError;
use crate::signals::{ControlSignal, RunTokens, SignalRouter};

pub struct AutomationSession {
    id: SessionId,
    config: EngineConfig,
    log: Arc<ObservationLog>,
    detector: Arc<PatternDetector>,
    executor: Arc<ActionExecutor>,
    replay: ReplayEngine,
    store: WorkflowStore,
    tokens: RunTokens,
}

impl AutomationSession {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn VariableProvider>,
    ) -> Result<Self, SessionError> {
        Self::with_clock(config, provider, Arc::new(TokioClock::new()))
    }

    pub fn with_clock(
        config: EngineConfig,
        provider: Arc<dyn VariableProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SessionError> {
        let log = Arc::new(ObservationLog::new(config.detector.window_size));
        let detector = Arc::new(PatternDetector::new(config.detector.clone(), log.clone())?);
        let executor = Arc::new(
            ActionExecutor::new(config.executor.clone())
                .with_clock(clock)
                .with_sink(log.clone()),
        );
        let replay = ReplayEngine::new(executor.clone(), provider).with_config(config.replay.clone());

        let id = SessionId::new();
        info!(session_id = %id, "Automation session started");
        Ok(Self {
            id,
            config,
            log,
            detector,
            executor,
            replay,
            store: WorkflowStore::new(),
            tokens: RunTokens::new(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub fn log(&self) -> &Arc<ObservationLog> {
        &self.log
    }

    pub fn detector(&self) -> &Arc<PatternDetector> {
        &self.detector
    }

    /// Token for the next run; cancelled by [`ControlSignal::Cancel`]
    pub fn run_token(&self) -> CancellationToken {
        self.tokens.current()
    }

    pub fn cancel(&self) {
        self.tokens.cancel();
    }

    /// Execute one action; every attempt lands in the observation log
    pub async fn execute_action(
        &self,
        action: &Action,
        driver: &dyn PageDriver,
        fallback: Option<&Action>,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.executor.execute(action, driver, fallback, cancel).await
    }

    /// Title and address of the page the session drives
    pub async fn page_info(&self, driver: &dyn PageDriver) -> Result<PageInfo, DriverError> {
        let info = action_primitives::page_info(driver).await?;
        debug!(session_id = %self.id, url = %info.url, "Read page info");
        Ok(info)
    }

    /// Live stream of observations
    pub fn observe(&self) -> broadcast::Receiver<Observation> {
        self.log.subscribe()
    }

    pub fn on_pattern_detected<F>(&self, callback: F)
    where
        F: Fn(&PatternCandidate) + Send + Sync + 'static,
    {
        self.detector.on_pattern_detected(callback);
    }

    pub fn scan_patterns(&self) -> Vec<PatternCandidate> {
        self.detector.scan()
    }

    /// Promote a detected candidate and store the resulting workflow
    pub fn confirm_pattern(
        &self,
        sequence: &[NormalizedAction],
        name: &str,
    ) -> Result<PromotedWorkflow, SessionError> {
        let promoted = self.detector.confirm(sequence, name)?;
        self.store.insert(promoted.workflow.clone())?;
        Ok(promoted)
    }

    pub async fn replay_workflow(
        &self,
        workflow: &Workflow,
        bindings: &VariableBindings,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, FlowError> {
        self.replay.replay(workflow, bindings, driver, cancel).await
    }

    /// Replay a stored workflow by id
    pub async fn replay_stored(
        &self,
        id: &WorkflowId,
        bindings: &VariableBindings,
        driver: &dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, FlowError> {
        let workflow = self
            .store
            .get(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        self.replay_workflow(&workflow, bindings, driver, cancel).await
    }

    /// Channel for external signals, applied by a background task
    pub fn control_channel(&self, capacity: usize) -> (mpsc::Sender<ControlSignal>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let router = SignalRouter::new(self.tokens.clone(), self.log.clone());
        (tx, router.spawn(rx))
    }

    /// Scan periodically until `cancel` fires
    pub fn spawn_detection(
        &self,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.detector.spawn_periodic(interval, cancel)
    }

    /// Discard unconfirmed candidates
    pub fn end(&self) {
        self.detector.end_session();
        info!(session_id = %self.id, "Automation session ended");
    }
}
