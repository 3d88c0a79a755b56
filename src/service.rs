//! Block Service - High-level play/stop wrapper for host applications
//!
//! Bundles validation, the sequence executor and an optional program store
//! behind the handful of calls an editor UI needs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    block::{validate, Block, Program, ValidationResult},
    channel::MotionChannel,
    config::Config,
    executor::{RunOutcome, RunState, SequenceExecutor},
    store::{ProgramStore, SavedProgram},
    telemetry::{ExecutionTelemetry, NoOpTelemetry},
    timing::TimingPolicy,
    CentoError, Result,
};

/// Handle to a run started with [`BlockService::start`]
pub type RunHandle = JoinHandle<Result<RunOutcome>>;

/// Block Service - one robot, one active run at a time
///
/// Dropping the service cancels any run it started.
pub struct BlockService {
    executor: Arc<SequenceExecutor>,
    store: Option<Arc<dyn ProgramStore>>,
}

impl BlockService {
    /// Create a service from configuration and an established motion channel
    pub fn new(config: &Config, channel: Arc<dyn MotionChannel>) -> Result<Self> {
        Self::with_telemetry(config, channel, Arc::new(NoOpTelemetry))
    }

    /// Create a service that reports execution events to `telemetry`
    pub fn with_telemetry(
        config: &Config,
        channel: Arc<dyn MotionChannel>,
        telemetry: Arc<dyn ExecutionTelemetry>,
    ) -> Result<Self> {
        info!("Initializing block service for robot {}", config.robot.name);
        let timing = TimingPolicy::new(config.timing.clone())?;
        let executor = SequenceExecutor::new(channel, timing).with_telemetry(telemetry);
        Ok(Self {
            executor: Arc::new(executor),
            store: None,
        })
    }

    /// Configure persistence for the service
    pub fn with_store(mut self, store: Arc<dyn ProgramStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn executor(&self) -> &Arc<SequenceExecutor> {
        &self.executor
    }

    pub fn validate(&self, blocks: &[Block]) -> ValidationResult {
        validate(blocks)
    }

    /// Nominal run length of `blocks`
    pub fn estimate(&self, blocks: &[Block]) -> Result<Duration> {
        let program = Program::from_blocks(blocks)?;
        Ok(self.executor.timing().estimate(&program))
    }

    /// Validate and run to the end on the current task
    pub async fn run(&self, blocks: &[Block]) -> Result<RunOutcome> {
        let program = Program::from_blocks(blocks)?;
        self.executor.run(&program).await
    }

    /// Validate and run in the background; stop it with [`BlockService::stop`]
    ///
    /// The run is active as soon as this returns, so an immediate `stop`
    /// cancels it before the first command.
    pub fn start(&self, blocks: &[Block]) -> Result<RunHandle> {
        let program = Program::from_blocks(blocks)?;
        self.executor.begin()?;
        let executor = Arc::clone(&self.executor);
        Ok(tokio::spawn(async move { Ok(executor.run_begun(&program).await) }))
    }

    /// Request cancellation of the active run
    pub fn stop(&self) {
        self.executor.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    pub fn state(&self) -> RunState {
        self.executor.state()
    }

    /// Persist `blocks` through the configured store
    pub async fn save(&self, blocks: &[Block]) -> Result<SavedProgram> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| CentoError::Store("no program store configured".to_string()))?;
        store.save(blocks).await
    }
}

impl Drop for BlockService {
    fn drop(&mut self) {
        self.executor.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockKind, Gesture};
    use crate::channel::LoggingChannel;
    use crate::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_invalid_program_never_starts() {
        let channel = Arc::new(LoggingChannel::new());
        let service = BlockService::new(&Config::default(), channel.clone()).unwrap();
        let blocks = vec![Block::new(BlockKind::Wheel, "Fly")];
        assert!(matches!(service.start(&blocks), Err(CentoError::Validation(_))));
        assert!(matches!(service.run(&blocks).await, Err(CentoError::Validation(_))));
        assert_eq!(channel.published(), 0);
        assert_eq!(service.state(), RunState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop() {
        let channel = Arc::new(LoggingChannel::new());
        let service = BlockService::new(&Config::default(), channel.clone()).unwrap();
        let blocks = vec![Block::arm(Gesture::Hi), Block::arm(Gesture::Home)];

        let handle = service.start(&blocks).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(service.is_running());
        assert!(matches!(service.start(&blocks), Err(CentoError::AlreadyRunning)));

        service.stop();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(channel.published(), 1);
        assert_eq!(service.state(), RunState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_right_after_start() {
        let channel = Arc::new(LoggingChannel::new());
        let service = BlockService::new(&Config::default(), channel.clone()).unwrap();
        let blocks = vec![Block::arm(Gesture::Hi), Block::arm(Gesture::Home)];

        let handle = service.start(&blocks).unwrap();
        assert_eq!(service.state(), RunState::Running);
        service.stop();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(channel.published(), 0);
        assert_eq!(service.state(), RunState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refused_on_disconnected_channel() {
        let channel = Arc::new(LoggingChannel::new());
        channel.disconnect();
        let service = BlockService::new(&Config::default(), channel.clone()).unwrap();

        let result = service.start(&[Block::arm(Gesture::Hi)]);
        assert!(matches!(result, Err(CentoError::ChannelUnavailable)));
        assert_eq!(service.state(), RunState::Idle);
    }

    #[test]
    fn test_zero_turn_tick_rejected() {
        let mut config = Config::default();
        config.timing.turn_publish_interval_ms = 0;
        let result = BlockService::new(&config, Arc::new(LoggingChannel::new()));
        assert!(matches!(result, Err(CentoError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_and_save() {
        let channel = Arc::new(LoggingChannel::new());
        let blocks = vec![Block::arm(Gesture::Hi), Block::delay(2.0)];

        let service = BlockService::new(&Config::default(), channel.clone()).unwrap();
        assert_eq!(service.estimate(&blocks).unwrap(), Duration::from_secs(7));
        assert!(matches!(service.save(&blocks).await, Err(CentoError::Store(_))));

        let service = service.with_store(Arc::new(MemoryStore::new()));
        let saved = service.save(&blocks).await.unwrap();
        assert_eq!(saved.blocks.len(), 2);
    }
}
