// Hardware contracts consumed by the swerve core
//
// Real motor controllers, encoders and gyros live outside this crate; they only need
// to implement these traits. `sim` provides in-memory implementations.

/// Error types reported by hardware drivers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("Absolute encoder on module {module} is unreadable")]
    AbsoluteEncoderUnavailable { module: usize },

    #[error("Sensor read failed: {0}")]
    ReadFailed(String),

    #[error("Actuator write failed: {0}")]
    WriteFailed(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Drive motor command for one module
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveOutput {
    /// Fraction of full output in [-1, 1]
    PercentOutput(f64),
    /// Native velocity control with an arbitrary feed-forward voltage
    Velocity { speed: f64, feedforward_volts: f64 },
}

/// One swerve module's steering motor, drive motor and encoders
///
/// Angles are radians, distances metres, velocities m/s.
pub trait ModuleDriver {
    /// Command the steering motor to an angle in the relative sensor's frame
    fn set_angle_target(&mut self, angle: f64) -> Result<()>;

    /// Command the drive motor
    fn set_drive_output(&mut self, output: DriveOutput) -> Result<()>;

    /// Relative (integrated) steering angle
    fn measured_angle(&mut self) -> Result<f64>;

    /// Wheel surface velocity
    fn measured_velocity(&mut self) -> Result<f64>;

    /// Cumulative wheel travel since power-on
    fn measured_distance(&mut self) -> Result<f64>;

    /// Raw absolute encoder angle, before the per-module offset is removed
    fn absolute_angle(&mut self) -> Result<f64>;

    /// Overwrite the relative steering sensor with `angle`
    fn seed_angle(&mut self, angle: f64) -> Result<()>;
}

/// Heading sensor (IMU). All readings are degrees.
pub trait HeadingSensor {
    fn yaw(&mut self) -> Result<f64>;

    fn pitch(&mut self) -> Result<f64>;

    fn roll(&mut self) -> Result<f64>;

    /// Software zero/offset: subsequent `yaw` readings continue from `degrees`
    fn set_yaw(&mut self, degrees: f64) -> Result<()>;
}
