//! Cento - block program execution for a gesture-and-wheels robot
//!
//! This library runs programs built from visual blocks (arm gestures, wheel
//! movements, delays and bounded repeat loops) against a robot reachable over
//! a publish/subscribe motion channel. It has no UI and no transport of its
//! own: hosts hand it a block tree and a [`MotionChannel`] implementation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cento::{Block, BlockService, Config, Gesture, LoggingChannel, WheelMotion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_from_path("config/default_config.yaml")?;
//!     let service = BlockService::new(&config, Arc::new(LoggingChannel::new()))?;
//!
//!     let program = vec![
//!         Block::arm(Gesture::Hi),
//!         Block::wheel(WheelMotion::MoveForward).with_param("duration", 2.0),
//!         Block::wheel(WheelMotion::TurnLeft).with_param("angle", 90.0),
//!     ];
//!     let outcome = service.run(&program).await?;
//!     println!("Run finished: {:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Block / Program**: editor-facing block tree and its validated, typed form
//! - **risk**: which consecutive wheel motions need an interlock pause
//! - **TimingPolicy**: how long each primitive holds the robot
//! - **SequenceExecutor**: the cancellable interpreter
//! - **BlockService**: play/stop wrapper for host applications
//! - **MotionChannel / ProgramStore / ServiceBrowser / ExecutionTelemetry**:
//!   seams to the outside world

pub mod block;
pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod risk;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod timing;
pub mod zenoh_channel;

// High-level exports for easy usage
pub use block::{validate, Block, BlockKind, Gesture, Program, ValidationError, ValidationResult, WheelMotion};
pub use config::{Config, RobotConfig, TimingConfig, TimingMode};
pub use error::{CentoError, Result};
pub use executor::{RunOutcome, RunState, SequenceExecutor};
pub use service::{BlockService, RunHandle};

// Core component exports for advanced usage
pub use block::{Instruction, ParamRange, Violation, ViolationKind};
pub use channel::{LoggingChannel, MotionChannel, Twist, Vector3};
pub use discovery::{discover, ChannelBrowser, ServiceBrowser, ServiceRecord, StaticBrowser};
pub use risk::{is_risky, Axis};
pub use store::{JsonFileStore, MemoryStore, ProgramRecord, ProgramStore, SavedProgram};
pub use telemetry::{BlockExecutionData, BlockStatus, ConsoleTelemetry, ExecutionTelemetry, NoOpTelemetry, RunEventData};
pub use timing::TimingPolicy;
pub use zenoh_channel::ZenohMotionChannel;
