//! Zenoh Motion Channel
//!
//! Publishes gesture and velocity commands to the robot over Zenoh.
//! Gestures go out as `{"data": "<name>"}` (the `std_msgs/String` shape) and
//! velocities as a JSON `Twist`, on the topics named in [`RobotConfig`].

use crate::channel::Twist;
use crate::config::RobotConfig;

#[cfg(feature = "zenoh-integration")]
use {
    crate::channel::MotionChannel,
    anyhow::{anyhow, Context, Result},
    async_trait::async_trait,
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    tracing::{debug, info},
    zenoh::{pubsub::Publisher, Session},
};

/// Gesture payload in the shape of `std_msgs/String`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GestureMessage {
    pub data: String,
}

/// Encode a gesture for the wire
pub fn encode_gesture(name: &str) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&GestureMessage { data: name.to_string() })
}

/// Encode a velocity command for the wire
pub fn encode_twist(twist: &Twist) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(twist)
}

/// `connect/endpoints` value for the robot's configured endpoint, if any
pub fn connect_endpoints(robot: &RobotConfig) -> Option<String> {
    robot
        .endpoint
        .as_ref()
        .map(|endpoint| serde_json::json!([endpoint]).to_string())
}

/// Zenoh-backed motion channel
#[cfg(feature = "zenoh-integration")]
pub struct ZenohMotionChannel {
    gesture_publisher: Arc<Publisher<'static>>,
    velocity_publisher: Arc<Publisher<'static>>,
    topics: (String, String),
    connected: AtomicBool,
    _session: Arc<Session>, // Keep session alive
}

#[cfg(feature = "zenoh-integration")]
impl ZenohMotionChannel {
    /// Open a Zenoh session and declare the gesture and velocity publishers
    pub async fn connect(robot: &RobotConfig) -> Result<Self> {
        info!("Opening Zenoh session for robot {}", robot.name);

        let mut config = zenoh::Config::default();
        if let Some(endpoints) = connect_endpoints(robot) {
            info!("Connecting to {}", endpoints);
            config
                .insert_json5("connect/endpoints", &endpoints)
                .map_err(|e| anyhow!("Invalid robot endpoint {}: {}", endpoints, e))?;
        }

        let session = zenoh::open(config)
            .await
            .map_err(|e| anyhow!("Failed to open Zenoh session: {}", e))?;

        let gesture_topic = robot.gesture_topic();
        let velocity_topic = robot.velocity_topic();

        let gesture_publisher = session
            .declare_publisher(gesture_topic.clone())
            .await
            .map_err(|e| anyhow!("Failed to create gesture publisher: {}", e))?;

        let velocity_publisher = session
            .declare_publisher(velocity_topic.clone())
            .await
            .map_err(|e| anyhow!("Failed to create velocity publisher: {}", e))?;

        info!("Zenoh publishers created successfully");
        debug!("  - Gesture publisher: {}", gesture_topic);
        debug!("  - Velocity publisher: {}", velocity_topic);

        Ok(Self {
            gesture_publisher: Arc::new(gesture_publisher),
            velocity_publisher: Arc::new(velocity_publisher),
            topics: (gesture_topic, velocity_topic),
            connected: AtomicBool::new(true),
            _session: Arc::new(session),
        })
    }

    /// Mark the channel as closed; later runs are refused
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        info!("Zenoh motion channel marked disconnected");
    }

    /// Get topic information for debugging
    pub fn get_topics(&self) -> Vec<&str> {
        vec![self.topics.0.as_str(), self.topics.1.as_str()]
    }
}

#[cfg(feature = "zenoh-integration")]
#[async_trait]
impl MotionChannel for ZenohMotionChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn publish_gesture(&self, name: &str) -> Result<()> {
        let payload = encode_gesture(name).context("Failed to serialize gesture")?;

        self.gesture_publisher
            .put(payload)
            .await
            .map_err(|e| anyhow!("Failed to publish gesture: {}", e))?;

        debug!("Published gesture {} to {}", name, self.topics.0);
        Ok(())
    }

    async fn publish_velocity(&self, twist: &Twist) -> Result<()> {
        let payload = encode_twist(twist).context("Failed to serialize velocity command")?;

        self.velocity_publisher
            .put(payload)
            .await
            .map_err(|e| anyhow!("Failed to publish velocity: {}", e))?;

        debug!("Published velocity to {}", self.topics.1);
        Ok(())
    }
}

#[cfg(not(feature = "zenoh-integration"))]
pub struct ZenohMotionChannel;

#[cfg(not(feature = "zenoh-integration"))]
impl ZenohMotionChannel {
    pub async fn connect(_robot: &RobotConfig) -> anyhow::Result<Self> {
        Err(anyhow::anyhow!("Zenoh integration not enabled. Enable with --features zenoh-integration"))
    }
}

#[cfg(not(feature = "zenoh-integration"))]
#[async_trait::async_trait]
impl crate::channel::MotionChannel for ZenohMotionChannel {
    fn is_connected(&self) -> bool {
        false
    }

    async fn publish_gesture(&self, _name: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("Zenoh integration not enabled"))
    }

    async fn publish_velocity(&self, _twist: &Twist) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("Zenoh integration not enabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gesture_payload() {
        let payload = encode_gesture("Namaste").unwrap();
        assert_eq!(payload, br#"{"data":"Namaste"}"#.to_vec());
    }

    #[test]
    fn test_twist_payload() {
        let payload = encode_twist(&Twist::linear_x(0.3)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["linear"]["x"], 0.3);
        assert_eq!(value["angular"]["z"], 0.0);
    }

    #[test]
    fn test_connect_endpoints() {
        let mut robot = RobotConfig::default();
        assert_eq!(connect_endpoints(&robot), None);

        robot.endpoint = Some("tcp/192.168.1.20:7447".to_string());
        assert_eq!(connect_endpoints(&robot).as_deref(), Some(r#"["tcp/192.168.1.20:7447"]"#));
    }

    #[cfg(feature = "zenoh-integration")]
    #[tokio::test]
    async fn test_zenoh_channel_creation() {
        // This test requires Zenoh to be running, so we'll make it conditional
        if std::env::var("ZENOH_TEST_ENABLED").is_ok() {
            let channel = ZenohMotionChannel::connect(&RobotConfig::default()).await;
            assert!(channel.is_ok(), "Should create ZenohMotionChannel successfully");

            let channel = channel.unwrap();
            assert!(channel.is_connected());
            assert!(channel.get_topics().contains(&"c20000002/cmd_vel"));
        }
    }

    #[cfg(not(feature = "zenoh-integration"))]
    #[tokio::test]
    async fn test_zenoh_channel_disabled() {
        let channel = ZenohMotionChannel::connect(&RobotConfig::default()).await;
        assert!(channel.is_err(), "Should fail when Zenoh feature is disabled");
    }
}
