pub mod commands;
pub mod config;
pub mod messages;
pub mod runtime;
pub mod swerve;
pub mod telemetry;
