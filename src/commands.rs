// Named command table
// Built once at startup and handed to the runtime; external tools trigger entries by name.

use std::collections::HashMap;

use tracing::warn;

/// Something the runtime can do to the drivetrain on request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveAction {
    /// Make the current direction field-forward
    ZeroHeading,
    /// Set the gyro yaw to a value in degrees
    SetYaw(f64),
    /// Drop any active command and stop the wheels
    Stop,
    /// Rotate in place toward a heading in degrees until released
    HoldHeading(f64),
    /// Leave heading hold
    ReleaseHeading,
}

/// Name -> action registration table
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, DriveAction>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock drivetrain commands
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("zero_heading", DriveAction::ZeroHeading);
        registry.register("stop", DriveAction::Stop);
        registry.register("face_forward", DriveAction::HoldHeading(0.0));
        registry.register("face_backward", DriveAction::HoldHeading(180.0));
        registry.register("release_heading", DriveAction::ReleaseHeading);
        // Autonomous starts with the robot facing the driver station
        registry.register("auto_start", DriveAction::SetYaw(180.0));
        registry
    }

    /// Add or replace a command. Returns the action previously registered under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        action: DriveAction,
    ) -> Option<DriveAction> {
        let name = name.into();
        let previous = self.commands.insert(name.clone(), action);
        if previous.is_some() {
            warn!("Named command '{}' was re-registered", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<DriveAction> {
        self.commands.get(name).copied()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
