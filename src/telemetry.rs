//! Telemetry abstraction for program runs
//!
//! Provides trait-based interface for publishing execution events
//! to any transport mechanism (Zenoh, websocket, stdout, etc.)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp as f64 seconds since UNIX epoch with consistent precision
pub fn current_timestamp() -> f64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    // Round to 6 decimal places for consistent formatting
    (timestamp * 1_000_000.0).round() / 1_000_000.0
}

/// Lifecycle of a single block within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Started,
    Interlock,
    Completed,
    Cancelled,
    Failed,
}

/// Block execution data for telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockExecutionData {
    /// Index path of the block from the program root, e.g. `1.0`
    pub block_path: String,
    pub label: String,
    pub status: BlockStatus,
    /// Milliseconds since the run started
    pub elapsed_ms: u64,
    pub message: Option<String>,
    pub timestamp: f64,
}

/// Run-level summary published once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventData {
    pub run_id: String,
    pub outcome: String,
    pub elapsed_ms: u64,
    pub commands_published: u64,
    pub message: Option<String>,
    pub timestamp: f64,
}

/// Trait for publishing execution telemetry
///
/// This keeps the executor independent of whatever backend
/// the host application wires it to.
#[async_trait]
pub trait ExecutionTelemetry: Send + Sync {
    /// Publish block execution events
    async fn publish_block(&self, data: &BlockExecutionData) -> anyhow::Result<()>;

    /// Publish the outcome of a finished run
    async fn publish_run(&self, data: &RunEventData) -> anyhow::Result<()>;
}

/// No-operation telemetry publisher
///
/// Default implementation that discards all telemetry data.
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl ExecutionTelemetry for NoOpTelemetry {
    async fn publish_block(&self, _data: &BlockExecutionData) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish_run(&self, _data: &RunEventData) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Console telemetry publisher for debugging
///
/// Prints all telemetry data to stdout in JSON format.
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    fn render<T: Serialize>(&self, data: &T) -> anyhow::Result<String> {
        let rendered = if self.pretty_print {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(rendered)
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionTelemetry for ConsoleTelemetry {
    async fn publish_block(&self, data: &BlockExecutionData) -> anyhow::Result<()> {
        println!("[BLOCK] {}", self.render(data)?);
        Ok(())
    }

    async fn publish_run(&self, data: &RunEventData) -> anyhow::Result<()> {
        println!("[RUN] {}", self.render(data)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_event_json() {
        let data = BlockExecutionData {
            block_path: "1.0".to_string(),
            label: "wheel TurnLeft".to_string(),
            status: BlockStatus::Interlock,
            elapsed_ms: 0,
            message: None,
            timestamp: 1.5,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["status"], "interlock");
        assert_eq!(json["block_path"], "1.0");
    }

    #[test]
    fn test_timestamp_is_unix_seconds() {
        let ts = current_timestamp();
        assert!(ts > 1_600_000_000.0);
    }
}
