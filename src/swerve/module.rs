// Per-module controller
// Turns a desired (speed, angle) into steering and drive commands for one module.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::debug;

use super::driver::{DriveOutput, ModuleDriver, Result};
use super::types::{wrap_angle, ModulePosition, ModuleState};

/// Speeds at or below this fraction of max speed keep the previous steering angle
const ANGLE_HOLD_FRACTION: f64 = 0.01;

/// Simple motor feed-forward for closed-loop drive: volts = ks * sign(v) + kv * v
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveFeedforward {
    pub ks: f64,
    pub kv: f64,
}

impl DriveFeedforward {
    pub fn volts(&self, speed: f64) -> f64 {
        if speed == 0.0 {
            return 0.0;
        }
        self.ks * speed.signum() + self.kv * speed
    }
}

/// Choose the steering target that needs at most a 90 degree turn.
///
/// If the target is more than 90 degrees away the module points the opposite way
/// and drives backwards instead.
pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
    let delta = wrap_angle(desired.angle - current_angle);
    if delta.abs() > FRAC_PI_2 {
        ModuleState::new(-desired.speed, desired.angle + PI)
    } else {
        desired
    }
}

/// Steering and drive targets for one module
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleCommand {
    /// Steering target in the relative sensor's frame
    pub angle: f64,
    pub output: DriveOutput,
}

/// Controller for one swerve module
pub struct SwerveModule<D: ModuleDriver> {
    index: usize,
    driver: D,
    /// Absolute encoder reading when the wheel points forward
    angle_offset: f64,
    max_speed: f64,
    feedforward: DriveFeedforward,
    last_angle: f64,
    last_command: Option<ModuleCommand>,
}

impl<D: ModuleDriver> SwerveModule<D> {
    pub fn new(
        index: usize,
        driver: D,
        angle_offset: f64,
        max_speed: f64,
        feedforward: DriveFeedforward,
    ) -> Self {
        Self {
            index,
            driver,
            angle_offset,
            max_speed,
            feedforward,
            last_angle: 0.0,
            last_command: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Re-sync the relative steering sensor to the absolute encoder.
    ///
    /// Must run once before any angle control is trusted.
    pub fn reset_to_absolute(&mut self) -> Result<()> {
        let absolute = self.driver.absolute_angle()?;
        let angle = wrap_angle(absolute - self.angle_offset);
        self.driver.seed_angle(angle)?;
        self.last_angle = angle;
        debug!(
            "Module {} reset to absolute angle {:.1} deg",
            self.index,
            angle.to_degrees()
        );
        Ok(())
    }

    /// Drive the module toward `desired`
    pub fn set_desired_state(&mut self, desired: ModuleState, open_loop: bool) -> Result<()> {
        let command = self.resolve(desired, open_loop)?;
        self.apply(command)
    }

    /// Work out the targets for `desired` against the measured angle without touching
    /// the actuators
    pub fn resolve(&mut self, desired: ModuleState, open_loop: bool) -> Result<ModuleCommand> {
        let current = self.driver.measured_angle()?;
        let state = optimize(desired, current);

        let output = if open_loop {
            DriveOutput::PercentOutput(state.speed / self.max_speed)
        } else {
            DriveOutput::Velocity {
                speed: state.speed,
                feedforward_volts: self.feedforward.volts(state.speed),
            }
        };

        // Hold the wheel angle when barely moving to avoid jitter
        let angle = if state.speed.abs() <= self.max_speed * ANGLE_HOLD_FRACTION {
            self.last_angle
        } else {
            state.angle
        };

        Ok(ModuleCommand { angle, output })
    }

    /// Send resolved targets to the driver
    pub fn apply(&mut self, command: ModuleCommand) -> Result<()> {
        self.driver.set_drive_output(command.output)?;
        self.driver.set_angle_target(command.angle)?;
        self.last_angle = command.angle;
        self.last_command = Some(command);
        Ok(())
    }

    /// Re-send the last targets that were fully applied; stopped at the held angle if none
    pub fn restore(&mut self) -> Result<()> {
        let command = self.last_command.unwrap_or(ModuleCommand {
            angle: self.last_angle,
            output: DriveOutput::PercentOutput(0.0),
        });
        self.driver.set_drive_output(command.output)?;
        self.driver.set_angle_target(command.angle)
    }

    /// Measured speed and steering angle
    pub fn state(&mut self) -> Result<ModuleState> {
        let speed = self.driver.measured_velocity()?;
        let angle = self.driver.measured_angle()?;
        Ok(ModuleState::new(speed, angle))
    }

    /// Cumulative distance and steering angle
    pub fn position(&mut self) -> Result<ModulePosition> {
        let distance = self.driver.measured_distance()?;
        let angle = self.driver.measured_angle()?;
        Ok(ModulePosition::new(distance, angle))
    }

    /// Raw absolute encoder angle
    pub fn absolute_angle(&mut self) -> Result<f64> {
        self.driver.absolute_angle()
    }
}
