//! Motion channel abstraction
//!
//! The executor talks to the robot only through [`MotionChannel`]. Both
//! publishes are fire-and-forget: an `Ok` means the message left this process,
//! not that the robot acted on it. Connection lifecycle is owned by whoever
//! builds the channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Velocity command in the shape of `geometry_msgs/Twist`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// Zero velocity on every axis
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn linear_x(speed: f64) -> Self {
        Self {
            linear: Vector3 { x: speed, ..Vector3::default() },
            angular: Vector3::default(),
        }
    }

    pub fn angular_z(rate: f64) -> Self {
        Self {
            linear: Vector3::default(),
            angular: Vector3 { z: rate, ..Vector3::default() },
        }
    }

    pub fn is_stop(&self) -> bool {
        *self == Self::stop()
    }
}

/// Publish-capable connection to the robot
#[async_trait]
pub trait MotionChannel: Send + Sync {
    /// Whether the underlying connection is currently up
    fn is_connected(&self) -> bool;

    /// Publish a named arm gesture on the gesture topic
    async fn publish_gesture(&self, name: &str) -> anyhow::Result<()>;

    /// Publish a velocity command on the velocity topic
    async fn publish_velocity(&self, twist: &Twist) -> anyhow::Result<()>;
}

/// Dry-run channel that only logs what would be sent
#[derive(Debug)]
pub struct LoggingChannel {
    connected: AtomicBool,
    published: AtomicU64,
}

impl LoggingChannel {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: AtomicU64::new(0),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Number of messages published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for LoggingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionChannel for LoggingChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn publish_gesture(&self, name: &str) -> anyhow::Result<()> {
        self.published.fetch_add(1, Ordering::Relaxed);
        info!("[dry-run] gesture: {}", name);
        Ok(())
    }

    async fn publish_velocity(&self, twist: &Twist) -> anyhow::Result<()> {
        self.published.fetch_add(1, Ordering::Relaxed);
        info!(
            "[dry-run] velocity: linear.x={:.3} angular.z={:.3}",
            twist.linear.x, twist.angular.z
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twist_wire_shape() {
        let json = serde_json::to_value(Twist::angular_z(-0.3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "linear": {"x": 0.0, "y": 0.0, "z": 0.0},
                "angular": {"x": 0.0, "y": 0.0, "z": -0.3}
            })
        );
        assert!(Twist::stop().is_stop());
        assert!(!Twist::linear_x(0.3).is_stop());
    }

    #[tokio::test]
    async fn test_logging_channel_counts() {
        let channel = LoggingChannel::new();
        assert!(channel.is_connected());
        channel.publish_gesture("Hi").await.unwrap();
        channel.publish_velocity(&Twist::stop()).await.unwrap();
        assert_eq!(channel.published(), 2);
        channel.disconnect();
        assert!(!channel.is_connected());
    }
}
