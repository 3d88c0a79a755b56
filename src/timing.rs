//! Timing policy - how long each primitive holds the robot
//!
//! Durations are best-effort software timers. The policy supports two arm
//! conventions ([`TimingMode`]): a fixed per-category wait, or a wait taken
//! from the block's own `time` parameter.

use std::f64::consts::PI;
use std::time::Duration;

use crate::block::{Instruction, Program, WheelMotion};
use crate::config::{TimingConfig, TimingMode};
use crate::risk::is_risky;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct TimingPolicy {
    config: TimingConfig,
}

/// Upper bound on any single wait
pub const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 3600);

/// Convert seconds to a `Duration`, treating negative or NaN input as zero
pub(crate) fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(MAX_WAIT).min(MAX_WAIT)
    } else {
        Duration::ZERO
    }
}

impl TimingPolicy {
    /// Build a policy, rejecting constants that would stall or spin the executor
    pub fn new(config: TimingConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { config })
    }

    pub fn mode(&self) -> TimingMode {
        self.config.mode
    }

    /// Wait after publishing a gesture
    pub fn arm_wait(&self, time: Option<f64>) -> Duration {
        match (self.config.mode, time) {
            (TimingMode::Parametrized, Some(time)) => seconds(time),
            _ => Duration::from_millis(self.config.arm_wait_ms),
        }
    }

    /// Hold time for a linear move
    pub fn move_duration(&self, duration: Option<f64>) -> Duration {
        seconds(duration.unwrap_or(self.config.move_default_secs))
    }

    /// Hold time for a turn of `angle_degrees`, corrected for wheel slip
    pub fn rotation_time(&self, angle_degrees: f64) -> Duration {
        let radians = angle_degrees * PI / 180.0;
        seconds(radians / (self.config.angular_speed + self.config.slip_correction))
    }

    /// Commanded angular rate in rad/s
    pub fn angular_speed(&self) -> f64 {
        self.config.angular_speed
    }

    pub fn turn_tick(&self) -> Duration {
        Duration::from_millis(self.config.turn_publish_interval_ms)
    }

    pub fn interlock(&self) -> Duration {
        Duration::from_millis(self.config.interlock_ms)
    }

    pub fn repeat_pause(&self) -> Duration {
        Duration::from_millis(self.config.repeat_pause_ms)
    }

    pub fn arm_settle(&self) -> Duration {
        Duration::from_millis(self.config.arm_settle_ms)
    }

    /// Wait owed to a single instruction; `None` for Repeat, which is timed by its body
    pub fn duration(&self, instruction: &Instruction) -> Option<Duration> {
        match instruction {
            Instruction::Arm { time, .. } => Some(self.arm_wait(*time)),
            Instruction::Wheel { motion, angle, duration, .. } => {
                if motion.is_turn() {
                    Some(self.rotation_time(*angle))
                } else {
                    Some(self.move_duration(*duration))
                }
            }
            Instruction::Delay { seconds: secs } => Some(seconds(*secs)),
            Instruction::Repeat { .. } => None,
        }
    }

    /// Nominal wall-clock length of a whole program, including interlocks,
    /// pauses, settles and turn tails
    pub fn estimate(&self, program: &Program) -> Duration {
        let mut previous = None;
        self.estimate_sequence(program.instructions(), false, &mut previous)
    }

    fn estimate_sequence(
        &self,
        instructions: &[Instruction],
        in_repeat: bool,
        previous: &mut Option<WheelMotion>,
    ) -> Duration {
        let mut total = Duration::ZERO;
        for instruction in instructions {
            match instruction {
                Instruction::Repeat { times, body } => {
                    let mut body_previous = None;
                    for iteration in 0..*times {
                        total += self.estimate_sequence(body, true, &mut body_previous);
                        if iteration + 1 < *times {
                            total += self.repeat_pause();
                        }
                    }
                }
                Instruction::Wheel { motion, .. } => {
                    if is_risky(*previous, *motion) {
                        total += self.interlock();
                    }
                    total += self.duration(instruction).unwrap_or_default();
                    if motion.is_turn() {
                        total += self.turn_tick();
                    }
                    *previous = Some(*motion);
                }
                Instruction::Arm { .. } => {
                    total += self.duration(instruction).unwrap_or_default();
                    if in_repeat {
                        total += self.arm_settle();
                    }
                }
                Instruction::Delay { .. } => {
                    total += self.duration(instruction).unwrap_or_default();
                }
            }
        }
        total
    }
}
