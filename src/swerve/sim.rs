// In-memory module driver and heading sensor
// Used when hardware is disabled and by tests. Steering is instantaneous and wheels
// never slip, so wheel travel is exactly velocity * dt.

use super::driver::{DriveOutput, DriverError, HeadingSensor, ModuleDriver, Result};
use super::drivetrain::Drivetrain;
use super::types::{wrap_angle, ModuleState, NUM_MODULES};

/// Simulated swerve module
#[derive(Debug, Clone)]
pub struct SimModuleDriver {
    module: usize,
    max_speed: f64,
    /// True steering angle of the wheel
    mechanical_angle: f64,
    /// Relative sensor reading minus the true angle (arbitrary at power-on)
    relative_bias: f64,
    /// Absolute encoder reading minus the true angle (the calibrated offset)
    absolute_offset: f64,
    velocity: f64,
    distance: f64,
    last_output: Option<DriveOutput>,
    absolute_available: bool,
    reads_fail: bool,
    writes_fail: bool,
}

impl SimModuleDriver {
    pub fn new(module: usize, max_speed: f64, absolute_offset: f64) -> Self {
        Self {
            module,
            max_speed,
            mechanical_angle: 0.0,
            relative_bias: 0.0,
            absolute_offset,
            velocity: 0.0,
            distance: 0.0,
            last_output: None,
            absolute_available: true,
            reads_fail: false,
            writes_fail: false,
        }
    }

    /// Start with the wheel at `mechanical_angle` and a relative sensor off by `relative_bias`
    pub fn with_power_on_angle(mut self, mechanical_angle: f64, relative_bias: f64) -> Self {
        self.mechanical_angle = wrap_angle(mechanical_angle);
        self.relative_bias = relative_bias;
        self
    }

    pub fn set_absolute_available(&mut self, available: bool) {
        self.absolute_available = available;
    }

    pub fn set_reads_fail(&mut self, fail: bool) {
        self.reads_fail = fail;
    }

    pub fn set_writes_fail(&mut self, fail: bool) {
        self.writes_fail = fail;
    }

    /// Most recent drive command accepted
    pub fn last_output(&self) -> Option<DriveOutput> {
        self.last_output
    }

    /// True wheel state (speed along the true steering angle)
    pub fn true_state(&self) -> ModuleState {
        ModuleState::new(self.velocity, self.mechanical_angle)
    }

    /// Advance wheel travel by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        self.distance += self.velocity * dt;
    }

    fn check_read(&self) -> Result<()> {
        if self.reads_fail {
            Err(DriverError::ReadFailed(format!("module {} encoder", self.module)))
        } else {
            Ok(())
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.writes_fail {
            Err(DriverError::WriteFailed(format!("module {} controller", self.module)))
        } else {
            Ok(())
        }
    }
}

impl ModuleDriver for SimModuleDriver {
    fn set_angle_target(&mut self, angle: f64) -> Result<()> {
        self.check_write()?;
        self.mechanical_angle = wrap_angle(angle - self.relative_bias);
        Ok(())
    }

    fn set_drive_output(&mut self, output: DriveOutput) -> Result<()> {
        self.check_write()?;
        self.velocity = match output {
            DriveOutput::PercentOutput(percent) => percent.clamp(-1.0, 1.0) * self.max_speed,
            DriveOutput::Velocity { speed, .. } => speed,
        };
        self.last_output = Some(output);
        Ok(())
    }

    fn measured_angle(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(wrap_angle(self.mechanical_angle + self.relative_bias))
    }

    fn measured_velocity(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(self.velocity)
    }

    fn measured_distance(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(self.distance)
    }

    fn absolute_angle(&mut self) -> Result<f64> {
        if !self.absolute_available {
            return Err(DriverError::AbsoluteEncoderUnavailable {
                module: self.module,
            });
        }
        Ok(wrap_angle(self.mechanical_angle + self.absolute_offset))
    }

    fn seed_angle(&mut self, angle: f64) -> Result<()> {
        self.relative_bias = angle - self.mechanical_angle;
        Ok(())
    }
}

/// Simulated gyro
#[derive(Debug, Clone, Default)]
pub struct SimHeadingSensor {
    yaw: f64,
    pitch: f64,
    roll: f64,
    reads_fail: bool,
}

impl SimHeadingSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tilt(&mut self, pitch: f64, roll: f64) {
        self.pitch = pitch;
        self.roll = roll;
    }

    pub fn set_reads_fail(&mut self, fail: bool) {
        self.reads_fail = fail;
    }

    /// Integrate a yaw rate in deg/s over `dt` seconds
    pub fn step(&mut self, yaw_rate: f64, dt: f64) {
        self.yaw += yaw_rate * dt;
    }

    fn check_read(&self) -> Result<()> {
        if self.reads_fail {
            Err(DriverError::ReadFailed("heading sensor".to_string()))
        } else {
            Ok(())
        }
    }
}

impl HeadingSensor for SimHeadingSensor {
    fn yaw(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(self.yaw)
    }

    fn pitch(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(self.pitch)
    }

    fn roll(&mut self) -> Result<f64> {
        self.check_read()?;
        Ok(self.roll)
    }

    fn set_yaw(&mut self, degrees: f64) -> Result<()> {
        self.yaw = degrees;
        Ok(())
    }
}

impl Drivetrain<SimModuleDriver, SimHeadingSensor> {
    /// Advance the simulated world by `dt` seconds: wheels roll, the gyro turns
    pub fn step_simulation(&mut self, dt: f64) {
        let mut true_states = [ModuleState::default(); NUM_MODULES];
        for (state, module) in true_states.iter_mut().zip(self.modules_mut().iter_mut()) {
            module.driver_mut().step(dt);
            *state = module.driver_mut().true_state();
        }

        let omega = self.kinematics().to_chassis_velocity(&true_states).omega;
        // An inverted gyro counts clockwise
        let sign = if self.config().invert_gyro { -1.0 } else { 1.0 };
        self.heading_sensor_mut().step(sign * omega.to_degrees(), dt);
    }
}
