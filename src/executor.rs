//! SequenceExecutor - runs a validated program against the motion channel
//!
//! The executor walks the instruction tree depth-first, left to right, as one
//! cooperative task. Every timed wait races against the cancellation
//! notification, so [`SequenceExecutor::cancel`] is observed within one
//! suspension point. Whenever a wheel command is live at the moment a run
//! unwinds, a zero-velocity stop is published first.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::block::{Instruction, Program, WheelMotion};
use crate::channel::{MotionChannel, Twist};
use crate::risk::is_risky;
use crate::telemetry::{
    current_timestamp, BlockExecutionData, BlockStatus, ExecutionTelemetry, NoOpTelemetry,
    RunEventData,
};
use crate::timing::TimingPolicy;
use crate::{CentoError, Result};

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl RunOutcome {
    fn name(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

/// Executor state; `Cancelling` is a run that has been asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Cancelling = 2,
    Completed = 3,
    Cancelled = 4,
    Failed = 5,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Cancelling,
            3 => RunState::Completed,
            4 => RunState::Cancelled,
            5 => RunState::Failed,
            _ => RunState::Idle,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Cancelling)
    }
}

/// Why a traversal stopped early
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed(String),
}

type Flow = std::result::Result<(), Halt>;
type BoxFlow<'a> = Pin<Box<dyn Future<Output = Flow> + Send + 'a>>;

/// Per-run bookkeeping
struct RunContext {
    run_id: Uuid,
    started: Instant,
    path: Vec<usize>,
    published: u64,
}

impl RunContext {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            path: Vec::new(),
            published: 0,
        }
    }

    fn path(&self) -> String {
        let parts: Vec<String> = self.path.iter().map(|i| i.to_string()).collect();
        parts.join(".")
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Resets the state if a run future is dropped before it finishes
struct ActiveRun<'a> {
    state: &'a AtomicU8,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        let current = RunState::from_u8(self.state.load(Ordering::SeqCst));
        if current.is_active() {
            self.state.store(RunState::Cancelled as u8, Ordering::SeqCst);
        }
    }
}

/// Cancellable interpreter for block programs
pub struct SequenceExecutor {
    channel: Arc<dyn MotionChannel>,
    timing: TimingPolicy,
    telemetry: Arc<dyn ExecutionTelemetry>,
    state: AtomicU8,
    wake: Notify,
}

impl SequenceExecutor {
    pub fn new(channel: Arc<dyn MotionChannel>, timing: TimingPolicy) -> Self {
        Self {
            channel,
            timing,
            telemetry: Arc::new(NoOpTelemetry),
            state: AtomicU8::new(RunState::Idle as u8),
            wake: Notify::new(),
        }
    }

    /// Set the telemetry publisher for block and run events
    pub fn with_telemetry(mut self, telemetry: Arc<dyn ExecutionTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn timing(&self) -> &TimingPolicy {
        &self.timing
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Ask the active run to stop. No-op when nothing is running or a
    /// cancellation is already pending.
    pub fn cancel(&self) {
        let requested = self
            .state
            .compare_exchange(
                RunState::Running as u8,
                RunState::Cancelling as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if requested {
            info!("Cancellation requested");
            self.wake.notify_waiters();
        }
    }

    fn cancel_requested(&self) -> bool {
        self.state() == RunState::Cancelling
    }

    /// Execute `program` to completion, cancellation or failure.
    ///
    /// Refused without side effects when a run is already active or the
    /// channel is down. Publish failures during the run are reported as
    /// [`RunOutcome::Failed`], not as an `Err`.
    pub async fn run(&self, program: &Program) -> Result<RunOutcome> {
        self.begin()?;
        Ok(self.run_begun(program).await)
    }

    /// Claim the executor for a new run: `Idle` or terminal becomes `Running`.
    ///
    /// From here on [`SequenceExecutor::cancel`] is honored, even before the
    /// run future is first polled.
    pub(crate) fn begin(&self) -> Result<()> {
        if self.is_running() {
            return Err(CentoError::AlreadyRunning);
        }
        if !self.channel.is_connected() {
            warn!("Refusing to run: motion channel is not connected");
            return Err(CentoError::ChannelUnavailable);
        }
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if RunState::from_u8(current).is_active() {
                return Err(CentoError::AlreadyRunning);
            }
            match self.state.compare_exchange(
                current,
                RunState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Execute `program` on an executor already claimed with `begin`
    pub(crate) async fn run_begun(&self, program: &Program) -> RunOutcome {
        let _active = ActiveRun { state: &self.state };

        // a cancel issued right after start lands before the first command
        tokio::task::yield_now().await;

        let mut ctx = RunContext::new();
        info!(
            "Run {} started ({} top-level blocks, {:?} timing)",
            ctx.run_id,
            program.len(),
            self.timing.mode()
        );

        let mut previous = None;
        let flow = self
            .visit_sequence(program.instructions(), false, &mut previous, &mut ctx)
            .await;

        let (outcome, state) = match flow {
            Ok(()) => (RunOutcome::Completed, RunState::Completed),
            Err(Halt::Cancelled) => (RunOutcome::Cancelled, RunState::Cancelled),
            Err(Halt::Failed(reason)) => (RunOutcome::Failed(reason), RunState::Failed),
        };
        self.state.store(state as u8, Ordering::SeqCst);

        match &outcome {
            RunOutcome::Failed(reason) => {
                warn!("Run {} failed after {}ms: {}", ctx.run_id, ctx.elapsed_ms(), reason)
            }
            other => info!(
                "Run {} {} after {}ms ({} commands)",
                ctx.run_id,
                other.name(),
                ctx.elapsed_ms(),
                ctx.published
            ),
        }

        let event = RunEventData {
            run_id: ctx.run_id.to_string(),
            outcome: outcome.name().to_string(),
            elapsed_ms: ctx.elapsed_ms(),
            commands_published: ctx.published,
            message: match &outcome {
                RunOutcome::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.telemetry.publish_run(&event).await {
            warn!("Failed to publish run event: {}", e);
        }

        outcome
    }

    fn visit_sequence<'a>(
        &'a self,
        instructions: &'a [Instruction],
        in_repeat: bool,
        previous: &'a mut Option<WheelMotion>,
        ctx: &'a mut RunContext,
    ) -> BoxFlow<'a> {
        Box::pin(async move {
            for (index, instruction) in instructions.iter().enumerate() {
                ctx.path.push(index);
                if self.cancel_requested() {
                    debug!("Cancelled before block {}", ctx.path());
                    return Err(Halt::Cancelled);
                }

                let flow = self.visit(instruction, in_repeat, previous, ctx).await;
                if let Err(halt) = &flow {
                    let (status, message) = match halt {
                        Halt::Cancelled => (BlockStatus::Cancelled, None),
                        Halt::Failed(reason) => (BlockStatus::Failed, Some(reason.clone())),
                    };
                    self.report(ctx, instruction, status, message).await;
                }
                flow?;
                ctx.path.pop();
            }
            Ok(())
        })
    }

    async fn visit(
        &self,
        instruction: &Instruction,
        in_repeat: bool,
        previous: &mut Option<WheelMotion>,
        ctx: &mut RunContext,
    ) -> Flow {
        match instruction {
            Instruction::Repeat { times, body } => {
                self.report(ctx, instruction, BlockStatus::Started, None).await;
                let mut body_previous = None;
                for iteration in 0..*times {
                    if self.cancel_requested() {
                        return Err(Halt::Cancelled);
                    }
                    debug!("Repeat {} iteration {}/{}", ctx.path(), iteration + 1, times);
                    self.visit_sequence(body, true, &mut body_previous, ctx).await?;
                    if iteration + 1 < *times {
                        self.wait(self.timing.repeat_pause()).await?;
                    }
                }
            }
            Instruction::Delay { .. } => {
                self.report(ctx, instruction, BlockStatus::Started, None).await;
                let duration = self.timing.duration(instruction).unwrap_or_default();
                debug!("Delay {}ms", duration.as_millis());
                self.wait(duration).await?;
            }
            Instruction::Arm { gesture, time } => {
                self.report(ctx, instruction, BlockStatus::Started, None).await;
                if let Err(e) = self.channel.publish_gesture(gesture.as_str()).await {
                    return Err(Halt::Failed(format!(
                        "Failed to publish gesture {}: {}",
                        gesture.as_str(),
                        e
                    )));
                }
                ctx.published += 1;
                self.wait(self.timing.arm_wait(*time)).await?;
                if in_repeat {
                    self.wait(self.timing.arm_settle()).await?;
                }
            }
            Instruction::Wheel { motion, speed, angle, duration } => {
                if is_risky(*previous, *motion) {
                    info!(
                        "Interlock {}ms before {} (after {})",
                        self.timing.interlock().as_millis(),
                        motion,
                        previous.map(|m| m.as_str()).unwrap_or("-")
                    );
                    self.report(ctx, instruction, BlockStatus::Interlock, None).await;
                    self.wait(self.timing.interlock()).await?;
                }
                self.report(ctx, instruction, BlockStatus::Started, None).await;
                if motion.is_turn() {
                    self.turn(*motion, *angle, ctx).await?;
                } else {
                    let hold = self.timing.move_duration(*duration);
                    self.drive(*motion, *speed, hold, ctx).await?;
                }
                *previous = Some(*motion);
            }
        }
        self.report(ctx, instruction, BlockStatus::Completed, None).await;
        Ok(())
    }

    /// Publish once, hold, then stop
    async fn drive(
        &self,
        motion: WheelMotion,
        speed: f64,
        hold: Duration,
        ctx: &mut RunContext,
    ) -> Flow {
        let velocity = match motion {
            WheelMotion::MoveBackward => -speed,
            _ => speed,
        };
        debug!("{} at {} m/s for {}ms", motion, velocity, hold.as_millis());
        self.publish_velocity(&Twist::linear_x(velocity), ctx).await?;

        if let Err(halt) = self.wait(hold).await {
            self.stop_wheels(ctx).await;
            return Err(halt);
        }
        self.publish_velocity(&Twist::stop(), ctx).await
    }

    /// Stream the angular command every tick for the rotation time, then stop.
    /// The block ends one tick after the rotation time.
    async fn turn(&self, motion: WheelMotion, angle: f64, ctx: &mut RunContext) -> Flow {
        let rate = match motion {
            WheelMotion::TurnRight => -self.timing.angular_speed(),
            _ => self.timing.angular_speed(),
        };
        let hold = self.timing.rotation_time(angle);
        let tick = self.timing.turn_tick();
        debug!("{} {}deg at {} rad/s for {}ms", motion, angle, rate, hold.as_millis());

        let command = Twist::angular_z(rate);
        let started = Instant::now();
        let mut ticks: u32 = 0;
        while tick * ticks < hold {
            if self.cancel_requested() {
                if ticks > 0 {
                    self.stop_wheels(ctx).await;
                }
                return Err(Halt::Cancelled);
            }
            if let Err(halt) = self.publish_velocity(&command, ctx).await {
                if ticks > 0 {
                    self.stop_wheels(ctx).await;
                }
                return Err(halt);
            }
            ticks += 1;
            if let Err(halt) = self.wait_until(started + tick * ticks).await {
                self.stop_wheels(ctx).await;
                return Err(halt);
            }
        }
        self.publish_velocity(&Twist::stop(), ctx).await?;
        self.wait_until(started + hold + tick).await
    }

    async fn publish_velocity(&self, twist: &Twist, ctx: &mut RunContext) -> Flow {
        match self.channel.publish_velocity(twist).await {
            Ok(()) => {
                ctx.published += 1;
                Ok(())
            }
            Err(e) => Err(Halt::Failed(format!("Failed to publish velocity: {}", e))),
        }
    }

    /// Best-effort zero-velocity stop while unwinding
    async fn stop_wheels(&self, ctx: &mut RunContext) {
        match self.channel.publish_velocity(&Twist::stop()).await {
            Ok(()) => {
                ctx.published += 1;
                info!("Wheels stopped while unwinding block {}", ctx.path());
            }
            Err(e) => warn!("Failed to stop wheels while unwinding: {}", e),
        }
    }

    async fn wait(&self, duration: Duration) -> Flow {
        self.wait_until(Instant::now() + duration).await
    }

    /// Sleep until `deadline` unless cancellation arrives first
    async fn wait_until(&self, deadline: Instant) -> Flow {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.cancel_requested() {
            return Err(Halt::Cancelled);
        }
        tokio::select! {
            _ = sleep_until(deadline) => Ok(()),
            _ = &mut notified => Err(Halt::Cancelled),
        }
    }

    async fn report(
        &self,
        ctx: &RunContext,
        instruction: &Instruction,
        status: BlockStatus,
        message: Option<String>,
    ) {
        let data = BlockExecutionData {
            block_path: ctx.path(),
            label: instruction.label(),
            status,
            elapsed_ms: ctx.elapsed_ms(),
            message,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.telemetry.publish_block(&data).await {
            warn!("Failed to publish block event: {}", e);
        }
    }
}
