// Swerve drivetrain control
//
// Provides:
// - Swerve inverse/forward kinematics with wheel-speed desaturation
// - Per-module angle optimisation and drive output
// - Odometry fused with a heading sensor
// - Closed-loop heading control
// - Simulated hardware for running without a robot

mod driver;
pub mod drivetrain;
pub mod heading;
pub mod kinematics;
pub mod module;
pub mod odometry;
pub mod sim;
mod types;

pub use driver::{DriveOutput, DriverError, HeadingSensor, ModuleDriver};
pub use drivetrain::{CalibrationState, Drivetrain, HolonomicDrive, SwerveError};
pub use kinematics::{desaturate_wheel_speeds, SwerveKinematics};
pub use types::{
    wrap_angle, ChassisVelocity, ModulePosition, ModuleState, Pose, MODULE_BACK_LEFT,
    MODULE_BACK_RIGHT, MODULE_FRONT_LEFT, MODULE_FRONT_RIGHT, NUM_MODULES,
};
