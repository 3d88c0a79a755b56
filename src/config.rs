//! Configuration loading for the block runner

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::{discovery::ServiceRecord, CentoError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub discovery: Option<DiscoveryConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub name: String,
    pub gesture_topic: Option<String>,
    pub velocity_topic: Option<String>,
    /// Zenoh locator to connect to, e.g. `tcp/192.168.1.20:7447`; peer
    /// scouting is used when unset
    pub endpoint: Option<String>,
}

/// Which convention the timing policy uses for arm gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Every gesture waits the fixed arm constant
    #[default]
    Fixed,
    /// A gesture's `time` parameter overrides the fixed constant
    Parametrized,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub mode: TimingMode,
    pub arm_wait_ms: u64,
    pub arm_settle_ms: u64,
    pub move_default_secs: f64,
    pub angular_speed: f64,
    pub slip_correction: f64,
    pub turn_publish_interval_ms: u64,
    pub interlock_ms: u64,
    pub repeat_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    pub service_type: Option<String>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub known_services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub path: Option<String>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: "c20000002".to_string(),
            gesture_topic: None,
            velocity_topic: None,
            endpoint: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mode: TimingMode::Fixed,
            arm_wait_ms: 5000,
            arm_settle_ms: 1500,
            move_default_secs: 2.0,
            angular_speed: 0.3,
            slip_correction: 0.0634,
            turn_publish_interval_ms: 100,
            interlock_ms: 2000,
            repeat_pause_ms: 2000,
        }
    }
}

impl Config {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| CentoError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.timing.check()?;
        Ok(config)
    }

    /// Get discovery configuration with defaults
    pub fn discovery(&self) -> DiscoveryConfig {
        self.discovery.clone().unwrap_or_default()
    }

    /// Get store configuration with defaults
    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }
}

impl RobotConfig {
    /// Point this robot at a discovered service: its name sets the topic
    /// prefix and its address becomes the connect endpoint
    pub fn apply_discovery(&mut self, record: &ServiceRecord) {
        self.name = record.name.clone();
        self.endpoint = Some(record.locator());
    }

    /// Topic that receives arm gesture names
    pub fn gesture_topic(&self) -> String {
        self.gesture_topic
            .clone()
            .unwrap_or_else(|| format!("{}/arm_topic", self.name))
    }

    /// Topic that receives wheel velocity commands
    pub fn velocity_topic(&self) -> String {
        self.velocity_topic
            .clone()
            .unwrap_or_else(|| format!("{}/cmd_vel", self.name))
    }
}

impl TimingConfig {
    /// Reject constants that would stall or spin the executor
    pub fn check(&self) -> Result<()> {
        if self.turn_publish_interval_ms == 0 {
            return Err(CentoError::Config("turn_publish_interval_ms must be positive".to_string()));
        }
        if !(self.angular_speed + self.slip_correction).is_finite()
            || self.angular_speed + self.slip_correction <= 0.0
        {
            return Err(CentoError::Config(
                "angular_speed + slip_correction must be a positive number".to_string(),
            ));
        }
        if !self.move_default_secs.is_finite() || self.move_default_secs < 0.0 {
            return Err(CentoError::Config("move_default_secs must be non-negative".to_string()));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: Some("CentoBot".to_string()),
            timeout_ms: Some(5000),
            known_services: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Get service type with default fallback
    pub fn service_type(&self) -> String {
        self.service_type.clone().unwrap_or_else(|| "CentoBot".to_string())
    }

    /// Get browse timeout with default fallback
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(5000))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: Some("programs".to_string()) }
    }
}

impl StoreConfig {
    /// Get store directory with default fallback
    pub fn path(&self) -> String {
        self.path.clone().unwrap_or_else(|| "programs".to_string())
    }
}
