// Timeouts, topics, drivetrain configuration
use std::path::{Path, PathBuf};
use std::time::Duration;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::swerve::heading::HeadingControlConfig;
use crate::swerve::NUM_MODULES;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "swerve/cmd/drive"; // operator drive commands
// robot-relative commands from a path follower
pub const TOPIC_CMD_CHASSIS: &str = "swerve/cmd/chassis";
pub const TOPIC_CMD_ACTION: &str = "swerve/cmd/action"; // named commands, pose resets
pub const TOPIC_POSE: &str = "swerve/state/pose"; // pose estimate
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status
pub const TOPIC_TELEMETRY_PREFIX: &str = "swerve/telemetry"; // per-quantity telemetry

/// Seconds per control tick
pub fn loop_period() -> f64 {
    1.0 / LOOP_HZ as f64
}

/// Error types for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Immutable parameter bundle for the drivetrain, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwerveConfig {
    /// Front-to-back distance between module contact points (m)
    pub wheel_base: f64,
    /// Left-to-right distance between module contact points (m)
    pub track_width: f64,
    /// Max module speed (m/s)
    pub max_speed: f64,
    /// Drive feed-forward static term (V)
    pub drive_ks: f64,
    /// Drive feed-forward velocity term (V per m/s)
    pub drive_kv: f64,
    /// Absolute encoder reading with the wheel pointing forward, per module (deg)
    pub angle_offsets_deg: [f64; NUM_MODULES],
    /// Gyro counts clockwise; heading is reported as 180 - yaw
    pub invert_gyro: bool,
    /// Settle time between construction and re-syncing modules to absolute
    pub settle_delay_ms: u64,
    pub heading: HeadingControlConfig,
}

impl Default for SwerveConfig {
    fn default() -> Self {
        Self {
            wheel_base: 0.552,
            track_width: 0.552,
            max_speed: 4.5,
            drive_ks: 0.32,
            drive_kv: 1.51,
            angle_offsets_deg: [0.0; NUM_MODULES],
            invert_gyro: false,
            settle_delay_ms: 1000,
            heading: HeadingControlConfig::default(),
        }
    }
}

impl SwerveConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SwerveConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("wheel_base", self.wheel_base),
            ("track_width", self.track_width),
            ("max_speed", self.max_speed),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.heading.max_angular_velocity <= 0.0 {
            return Err(ConfigError::Invalid(
                "heading.max_angular_velocity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Module contact points relative to the robot centre, in module index order:
    /// front-left, front-right, back-left, back-right
    pub fn module_offsets(&self) -> [Vector2<f64>; NUM_MODULES] {
        let x = self.wheel_base / 2.0;
        let y = self.track_width / 2.0;
        [
            Vector2::new(x, y),
            Vector2::new(x, -y),
            Vector2::new(-x, y),
            Vector2::new(-x, -y),
        ]
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
