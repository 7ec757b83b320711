// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::swerve::Pose;

fn default_true() -> bool {
    true
}

// Command from teleop/scripts -> runtime
// Linear velocities in m/s, theta_vel in rad/s (counter-clockwise positive)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriveCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
    #[serde(default = "default_true")]
    pub field_relative: bool,
    #[serde(default = "default_true")]
    pub open_loop: bool,
}

impl DriveCommand {
    pub fn is_zero(&self) -> bool {
        self.x_vel == 0.0 && self.y_vel == 0.0 && self.theta_vel == 0.0
    }
}

/// One-shot requests: named commands, pose resets, gyro yaw changes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    Named { name: String },
    ResetPose { x: f64, y: f64, heading_deg: f64 },
    SetYaw { degrees: f64 },
}

/// Pose estimate published every tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PoseMessage {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl From<Pose> for PoseMessage {
    fn from(pose: Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            heading_deg: pose.heading.to_degrees(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Calibrating,
}

impl RuntimeHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeHealth::Ok => "ok",
            RuntimeHealth::CmdStale => "cmd_stale",
            RuntimeHealth::Calibrating => "calibrating",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_command_defaults() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"x_vel": 1.0, "y_vel": 0.0, "theta_vel": 0.5}"#).unwrap();
        assert!(cmd.field_relative);
        assert!(cmd.open_loop);
    }

    #[test]
    fn test_action_command_tags() {
        let named: ActionCommand =
            serde_json::from_str(r#"{"action": "named", "name": "zero_heading"}"#).unwrap();
        assert_eq!(
            named,
            ActionCommand::Named {
                name: "zero_heading".to_string()
            }
        );

        let reset: ActionCommand = serde_json::from_str(
            r#"{"action": "reset_pose", "x": 1.0, "y": 2.0, "heading_deg": 90.0}"#,
        )
        .unwrap();
        assert!(matches!(reset, ActionCommand::ResetPose { .. }));
    }

    #[test]
    fn test_health_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
    }
}
