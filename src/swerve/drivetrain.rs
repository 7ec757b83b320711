// Drivetrain coordinator
//
// Owns the four modules, the heading sensor, kinematics and odometry. Driven by an
// external loop: commands first, then `tick` once per control cycle.

use std::fmt;
use std::time::Instant;

use nalgebra::Vector2;
use tracing::{debug, info, warn};

use super::driver::{DriverError, HeadingSensor, ModuleDriver};
use super::heading::HeadingController;
use super::kinematics::{desaturate_wheel_speeds, KinematicsError, SwerveKinematics};
use super::module::{DriveFeedforward, SwerveModule};
use super::odometry::SwerveOdometry;
use super::types::{wrap_angle, ChassisVelocity, ModulePosition, ModuleState, Pose, NUM_MODULES};
use crate::config::{loop_period, ConfigError, SwerveConfig};
use crate::telemetry::TelemetryFrame;

/// Error types for drivetrain operation
#[derive(Debug, thiserror::Error)]
pub enum SwerveError {
    #[error("Drivetrain is not ready (state: {0})")]
    NotReady(CalibrationState),

    #[error("Calibration failed on module {module}: {source}")]
    Calibration {
        module: usize,
        #[source]
        source: DriverError,
    },

    #[error("Hardware error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Start-up calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// Constructed, calibration not started
    Uninitialized,
    /// Waiting for motor drivers to settle before re-syncing module angles
    Calibrating { since: Instant },
    /// Module angles resolved, odometry running
    Ready,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationState::Uninitialized => write!(f, "uninitialized"),
            CalibrationState::Calibrating { .. } => write!(f, "calibrating"),
            CalibrationState::Ready => write!(f, "ready"),
        }
    }
}

/// The contract an external trajectory follower needs. All velocities are robot-relative.
pub trait HolonomicDrive {
    fn pose(&self) -> Pose;

    fn reset_pose(&mut self, pose: Pose) -> Result<(), SwerveError>;

    fn robot_relative_velocity(&mut self) -> Result<ChassisVelocity, SwerveError>;

    fn drive_robot_relative(&mut self, velocity: ChassisVelocity) -> Result<(), SwerveError>;
}

/// Four-module swerve drivetrain
pub struct Drivetrain<D: ModuleDriver, G: HeadingSensor> {
    config: SwerveConfig,
    modules: [SwerveModule<D>; NUM_MODULES],
    gyro: G,
    kinematics: SwerveKinematics,
    /// Seeded when calibration completes
    odometry: Option<SwerveOdometry>,
    heading_controller: HeadingController,
    calibration: CalibrationState,
}

impl<D: ModuleDriver, G: HeadingSensor> Drivetrain<D, G> {
    /// Build a drivetrain from module drivers in index order
    pub fn new(
        config: SwerveConfig,
        drivers: [D; NUM_MODULES],
        gyro: G,
    ) -> Result<Self, SwerveError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(config.module_offsets())?;

        let feedforward = DriveFeedforward {
            ks: config.drive_ks,
            kv: config.drive_kv,
        };
        let mut index = 0;
        let modules = drivers.map(|driver| {
            let module = SwerveModule::new(
                index,
                driver,
                config.angle_offsets_deg[index].to_radians(),
                config.max_speed,
                feedforward,
            );
            index += 1;
            module
        });

        let heading_controller = HeadingController::new(config.heading, loop_period());

        Ok(Self {
            config,
            modules,
            gyro,
            kinematics,
            odometry: None,
            heading_controller,
            calibration: CalibrationState::Uninitialized,
        })
    }

    pub fn config(&self) -> &SwerveConfig {
        &self.config
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule<D>; NUM_MODULES] {
        &mut self.modules
    }

    pub fn heading_sensor_mut(&mut self) -> &mut G {
        &mut self.gyro
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration
    }

    pub fn is_ready(&self) -> bool {
        self.calibration == CalibrationState::Ready
    }

    /// Zero the gyro and start the settle timer. Module angles are resolved by a later `tick`.
    pub fn begin_calibration(&mut self, now: Instant) -> Result<(), SwerveError> {
        self.zero_heading()?;
        self.calibration = CalibrationState::Calibrating { since: now };
        info!(
            "Calibration started, settling for {}ms",
            self.config.settle_delay_ms
        );
        Ok(())
    }

    fn finish_calibration(&mut self) -> Result<(), SwerveError> {
        for module in self.modules.iter_mut() {
            let index = module.index();
            module
                .reset_to_absolute()
                .map_err(|source| SwerveError::Calibration { module: index, source })?;
        }

        let heading = self.heading()?;
        let positions = self.module_positions()?;
        self.odometry = Some(SwerveOdometry::new(
            self.kinematics.clone(),
            heading,
            positions,
            Pose::default(),
        ));
        self.calibration = CalibrationState::Ready;
        info!("Modules synced to absolute encoders, drivetrain ready");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), SwerveError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SwerveError::NotReady(self.calibration))
        }
    }

    /// Once per control cycle: advance calibration, update odometry, record telemetry.
    ///
    /// Only calibration failure is returned as an error; sensor read failures hold the
    /// previous pose for this tick.
    pub fn tick(
        &mut self,
        now: Instant,
        telemetry: &mut TelemetryFrame,
    ) -> Result<(), SwerveError> {
        match self.calibration {
            CalibrationState::Uninitialized => {}
            CalibrationState::Calibrating { since } => {
                if now.saturating_duration_since(since) >= self.config.settle_delay() {
                    self.finish_calibration()?;
                }
            }
            CalibrationState::Ready => self.update_odometry(),
        }

        self.record_telemetry(telemetry);
        Ok(())
    }

    fn update_odometry(&mut self) {
        let sample = self
            .heading()
            .and_then(|heading| Ok((heading, self.module_positions()?)));

        match (sample, self.odometry.as_mut()) {
            (Ok((heading, positions)), Some(odometry)) => {
                odometry.update(heading, positions);
            }
            (Err(e), _) => warn!("Skipping odometry update, holding previous pose: {}", e),
            (Ok(_), None) => {}
        }
    }

    /// Robot heading from the gyro, wrapped radians
    pub fn heading(&mut self) -> Result<f64, DriverError> {
        let yaw = self.gyro.yaw()?;
        let degrees = if self.config.invert_gyro { 180.0 - yaw } else { yaw };
        Ok(wrap_angle(degrees.to_radians()))
    }

    /// Set the gyro yaw; the pose heading stays continuous
    pub fn set_sensor_yaw(&mut self, degrees: f64) -> Result<(), SwerveError> {
        self.gyro.set_yaw(degrees)?;
        let heading = self.heading()?;
        if let Some(odometry) = self.odometry.as_mut() {
            odometry.rebase_heading(heading);
        }
        info!("Gyro yaw set to {:.1} deg", degrees);
        Ok(())
    }

    /// Make the current direction field-forward for field-relative driving
    pub fn zero_heading(&mut self) -> Result<(), SwerveError> {
        self.set_sensor_yaw(0.0)
    }

    /// Drive with a translation (m/s) and rotation (rad/s)
    pub fn drive(
        &mut self,
        translation: Vector2<f64>,
        rotation: f64,
        field_relative: bool,
        open_loop: bool,
    ) -> Result<(), SwerveError> {
        self.ensure_ready()?;
        let heading = if field_relative { self.heading()? } else { 0.0 };

        let velocity = ChassisVelocity::new(translation.x, translation.y, rotation);
        let mut states = self
            .kinematics
            .to_module_states(velocity, field_relative, heading);
        desaturate_wheel_speeds(&mut states, self.config.max_speed);

        self.apply_states(states, open_loop)
    }

    /// Closed-loop module targets from an external trajectory follower
    pub fn set_module_states(
        &mut self,
        mut states: [ModuleState; NUM_MODULES],
    ) -> Result<(), SwerveError> {
        self.ensure_ready()?;
        desaturate_wheel_speeds(&mut states, self.config.max_speed);
        self.apply_states(states, false)
    }

    /// All modules take the new targets or all keep their previous ones
    fn apply_states(
        &mut self,
        states: [ModuleState; NUM_MODULES],
        open_loop: bool,
    ) -> Result<(), SwerveError> {
        let mut commands = Vec::with_capacity(NUM_MODULES);
        for (module, state) in self.modules.iter_mut().zip(states) {
            commands.push(module.resolve(state, open_loop)?);
        }

        for (i, command) in commands.into_iter().enumerate() {
            if let Err(e) = self.modules[i].apply(command) {
                warn!("Module {} rejected its target, restoring previous targets: {}", i, e);
                for module in self.modules[..=i].iter_mut() {
                    if let Err(restore_error) = module.restore() {
                        warn!("Module {} restore failed: {}", module.index(), restore_error);
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Zero translation and rotation; wheels keep their angles
    pub fn stop(&mut self) -> Result<(), SwerveError> {
        self.drive(Vector2::zeros(), 0.0, false, true)
    }

    /// Turn toward a field heading in degrees. Returns the commanded angular velocity.
    pub fn rotate_to_degree(&mut self, target: f64) -> Result<f64, SwerveError> {
        self.ensure_ready()?;
        let current = self.heading()?.to_degrees();
        let rotation = self.heading_controller.rotate_toward(current, target);
        self.drive(Vector2::zeros(), rotation, false, true)?;
        Ok(rotation)
    }

    pub fn reset_heading_controller(&mut self) {
        self.heading_controller.reset();
    }

    pub fn module_states(&mut self) -> Result<[ModuleState; NUM_MODULES], DriverError> {
        let mut states = [ModuleState::default(); NUM_MODULES];
        for (state, module) in states.iter_mut().zip(self.modules.iter_mut()) {
            *state = module.state()?;
        }
        Ok(states)
    }

    pub fn module_positions(&mut self) -> Result<[ModulePosition; NUM_MODULES], DriverError> {
        let mut positions = [ModulePosition::default(); NUM_MODULES];
        for (position, module) in positions.iter_mut().zip(self.modules.iter_mut()) {
            *position = module.position()?;
        }
        Ok(positions)
    }

    /// Latest pose snapshot (origin until calibration completes)
    pub fn pose(&self) -> Pose {
        self.odometry
            .as_ref()
            .map(SwerveOdometry::pose)
            .unwrap_or_default()
    }

    /// Overwrite the pose estimate, e.g. at match start or from a vision fix
    pub fn reset_pose(&mut self, pose: Pose) -> Result<(), SwerveError> {
        self.ensure_ready()?;
        let heading = self.heading()?;
        let positions = self.module_positions()?;
        if let Some(odometry) = self.odometry.as_mut() {
            odometry.reset_pose(heading, positions, pose);
        }
        let pose = self.pose();
        info!(
            "Pose reset to ({:.2}, {:.2}, {:.1} deg)",
            pose.x,
            pose.y,
            pose.heading.to_degrees()
        );
        Ok(())
    }

    /// Measured robot-relative chassis velocity
    pub fn robot_relative_velocity(&mut self) -> Result<ChassisVelocity, SwerveError> {
        let states = self.module_states()?;
        Ok(self.kinematics.to_chassis_velocity(&states))
    }

    /// Closed-loop robot-relative drive, for trajectory followers
    pub fn drive_robot_relative(&mut self, velocity: ChassisVelocity) -> Result<(), SwerveError> {
        self.ensure_ready()?;
        let states = self.kinematics.to_module_states(velocity, false, 0.0);
        self.set_module_states(states)
    }

    fn record_telemetry(&mut self, telemetry: &mut TelemetryFrame) {
        telemetry.put_string("drivetrain/state", self.calibration.to_string());

        let pose = self.pose();
        telemetry.put_number("pose/x", pose.x);
        telemetry.put_number("pose/y", pose.y);
        telemetry.put_number("pose/heading_deg", pose.heading.to_degrees());
        telemetry.put_string("pose/location", format!("({:.2}, {:.2})", pose.x, pose.y));

        match self.heading() {
            Ok(heading) => telemetry.put_number("gyro/heading_deg", heading.to_degrees()),
            Err(e) => debug!("No heading telemetry: {}", e),
        }
        if let (Ok(pitch), Ok(roll)) = (self.gyro.pitch(), self.gyro.roll()) {
            telemetry.put_number("gyro/pitch_deg", pitch);
            telemetry.put_number("gyro/roll_deg", roll);
        }

        for module in self.modules.iter_mut() {
            let i = module.index();
            if let Ok(absolute) = module.absolute_angle() {
                telemetry.put_number(format!("module/{}/absolute_deg", i), absolute.to_degrees());
            }
            if let Ok(position) = module.position() {
                telemetry.put_number(
                    format!("module/{}/integrated_deg", i),
                    position.angle.to_degrees(),
                );
                telemetry.put_number(format!("module/{}/position", i), position.distance);
            }
            if let Ok(state) = module.state() {
                telemetry.put_number(format!("module/{}/velocity", i), state.speed);
            }
        }
    }
}

impl<D: ModuleDriver, G: HeadingSensor> HolonomicDrive for Drivetrain<D, G> {
    fn pose(&self) -> Pose {
        Drivetrain::pose(self)
    }

    fn reset_pose(&mut self, pose: Pose) -> Result<(), SwerveError> {
        Drivetrain::reset_pose(self, pose)
    }

    fn robot_relative_velocity(&mut self) -> Result<ChassisVelocity, SwerveError> {
        Drivetrain::robot_relative_velocity(self)
    }

    fn drive_robot_relative(&mut self, velocity: ChassisVelocity) -> Result<(), SwerveError> {
        Drivetrain::drive_robot_relative(self, velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::sim::{SimHeadingSensor, SimModuleDriver};
    use crate::swerve::driver::DriveOutput;
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::time::Duration;

    type SimDrivetrain = Drivetrain<SimModuleDriver, SimHeadingSensor>;

    const DT: f64 = 0.02;

    fn square_config() -> SwerveConfig {
        SwerveConfig {
            wheel_base: 1.0,
            track_width: 1.0,
            max_speed: 4.5,
            angle_offsets_deg: [10.0, -20.0, 30.0, -40.0],
            ..Default::default()
        }
    }

    fn sim_drivetrain(config: SwerveConfig) -> SimDrivetrain {
        let drivers: [SimModuleDriver; NUM_MODULES] = std::array::from_fn(|i| {
            // Arbitrary power-on relative sensor bias; absolute encoder carries the offset
            SimModuleDriver::new(i, config.max_speed, config.angle_offsets_deg[i].to_radians())
                .with_power_on_angle(0.1 * i as f64, 1.0 + i as f64)
        });
        Drivetrain::new(config, drivers, SimHeadingSensor::new()).unwrap()
    }

    fn ready_drivetrain() -> (SimDrivetrain, Instant) {
        let mut drivetrain = sim_drivetrain(square_config());
        let start = Instant::now();
        drivetrain.begin_calibration(start).unwrap();
        let now = start + drivetrain.config().settle_delay();
        drivetrain.tick(now, &mut TelemetryFrame::new()).unwrap();
        assert!(drivetrain.is_ready());
        (drivetrain, now)
    }

    /// Run `ticks` control cycles, re-issuing the same drive command each cycle
    fn drive_for(
        drivetrain: &mut SimDrivetrain,
        now: &mut Instant,
        ticks: usize,
        translation: Vector2<f64>,
        rotation: f64,
        field_relative: bool,
    ) {
        for _ in 0..ticks {
            drivetrain
                .drive(translation, rotation, field_relative, false)
                .unwrap();
            drivetrain.step_simulation(DT);
            *now += Duration::from_secs_f64(DT);
            drivetrain.tick(*now, &mut TelemetryFrame::new()).unwrap();
        }
    }

    #[test]
    fn test_rejects_commands_until_settled() {
        let mut drivetrain = sim_drivetrain(square_config());
        assert!(matches!(
            drivetrain.drive(Vector2::new(1.0, 0.0), 0.0, false, false),
            Err(SwerveError::NotReady(CalibrationState::Uninitialized))
        ));

        let start = Instant::now();
        drivetrain.begin_calibration(start).unwrap();
        drivetrain
            .tick(start + Duration::from_millis(500), &mut TelemetryFrame::new())
            .unwrap();
        assert!(matches!(
            drivetrain.calibration_state(),
            CalibrationState::Calibrating { .. }
        ));
        assert!(matches!(
            drivetrain.reset_pose(Pose::default()),
            Err(SwerveError::NotReady(_))
        ));

        drivetrain
            .tick(start + Duration::from_millis(1000), &mut TelemetryFrame::new())
            .unwrap();
        assert!(drivetrain.is_ready());
        assert!(drivetrain.drive(Vector2::new(1.0, 0.0), 0.0, false, false).is_ok());
    }

    #[test]
    fn test_calibration_failure_is_fatal() {
        let mut drivetrain = sim_drivetrain(square_config());
        drivetrain.modules_mut()[2]
            .driver_mut()
            .set_absolute_available(false);

        let start = Instant::now();
        drivetrain.begin_calibration(start).unwrap();
        let result =
            drivetrain.tick(start + Duration::from_secs(2), &mut TelemetryFrame::new());

        assert!(matches!(
            result,
            Err(SwerveError::Calibration { module: 2, .. })
        ));
        assert!(!drivetrain.is_ready());
        assert!(drivetrain.drive(Vector2::new(1.0, 0.0), 0.0, false, false).is_err());
    }

    #[test]
    fn test_calibration_resolves_module_angles() {
        let (mut drivetrain, _) = ready_drivetrain();
        let positions = drivetrain.module_positions().unwrap();
        for (i, position) in positions.iter().enumerate() {
            assert!(
                (position.angle - 0.1 * i as f64).abs() < 1e-9,
                "module {} angle {}",
                i,
                position.angle
            );
        }
    }

    #[test]
    fn test_forward_command_on_unit_square() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain
            .drive(Vector2::new(1.0, 0.0), 0.0, false, false)
            .unwrap();

        for (i, state) in drivetrain.module_states().unwrap().iter().enumerate() {
            assert!(state.angle.abs() < 1e-9, "module {} angle {}", i, state.angle);
            assert!((state.speed - 1.0).abs() < 1e-9, "module {} speed {}", i, state.speed);
        }
    }

    #[test]
    fn test_zero_command_keeps_angles() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain
            .drive(Vector2::new(0.3, 0.8), 0.5, false, false)
            .unwrap();
        let moving = drivetrain.module_states().unwrap();

        for _ in 0..3 {
            drivetrain.stop().unwrap();
            let stopped = drivetrain.module_states().unwrap();
            for (still, before) in stopped.iter().zip(moving.iter()) {
                assert_eq!(still.speed, 0.0);
                assert!((still.angle - before.angle).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_drive_desaturates() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain
            .drive(Vector2::new(6.0, 2.0), 4.0, false, false)
            .unwrap();
        let states = drivetrain.module_states().unwrap();
        let max = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);
        assert!((max - 4.5).abs() < 1e-9, "fastest module at {}", max);
    }

    #[test]
    fn test_set_module_states_desaturates_closed_loop() {
        let (mut drivetrain, _) = ready_drivetrain();
        let mut states = [ModuleState::new(2.0, 0.0); NUM_MODULES];
        states[1] = ModuleState::new(9.0, 0.0);
        drivetrain.set_module_states(states).unwrap();

        let expected = [1.0, 4.5, 1.0, 1.0];
        let measured = drivetrain.module_states().unwrap();
        for (i, module) in drivetrain.modules_mut().iter_mut().enumerate() {
            assert!((measured[i].speed - expected[i]).abs() < 1e-9, "module {}", i);
            match module.driver_mut().last_output() {
                Some(DriveOutput::Velocity { speed, .. }) => {
                    assert!((speed - expected[i]).abs() < 1e-9)
                }
                other => panic!("module {} got {:?}", i, other),
            }
        }
    }

    #[test]
    fn test_rejected_write_keeps_previous_targets() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain
            .drive(Vector2::new(1.0, 0.0), 0.0, false, false)
            .unwrap();
        let before = drivetrain.module_states().unwrap();

        drivetrain.modules_mut()[2].driver_mut().set_writes_fail(true);
        assert!(matches!(
            drivetrain.drive(Vector2::new(0.0, 2.0), 0.0, false, false),
            Err(SwerveError::Driver(DriverError::WriteFailed(_)))
        ));

        let after = drivetrain.module_states().unwrap();
        for (i, (a, b)) in after.iter().zip(before.iter()).enumerate() {
            assert!((a.speed - b.speed).abs() < 1e-12, "module {} speed", i);
            assert!((a.angle - b.angle).abs() < 1e-12, "module {} angle", i);
        }
    }

    #[test]
    fn test_failed_read_sends_no_targets() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain
            .drive(Vector2::new(1.0, 0.0), 0.0, false, false)
            .unwrap();
        let before = drivetrain.module_states().unwrap();

        drivetrain.modules_mut()[3].driver_mut().set_reads_fail(true);
        assert!(drivetrain.drive(Vector2::new(0.0, 2.0), 0.0, false, false).is_err());
        drivetrain.modules_mut()[3].driver_mut().set_reads_fail(false);

        assert_eq!(drivetrain.module_states().unwrap(), before);
    }

    #[test]
    fn test_odometry_tracks_straight_drive() {
        let (mut drivetrain, mut now) = ready_drivetrain();
        drive_for(&mut drivetrain, &mut now, 50, Vector2::new(1.0, 0.0), 0.0, false);

        let pose = drivetrain.pose();
        assert!((pose.x - 1.0).abs() < 1e-6, "x = {}", pose.x);
        assert!(pose.y.abs() < 1e-6);
        assert!(pose.heading.abs() < 1e-9);
    }

    #[test]
    fn test_odometry_heading_follows_gyro() {
        let (mut drivetrain, mut now) = ready_drivetrain();
        // 0.5 rad/s for 1 s
        drive_for(&mut drivetrain, &mut now, 50, Vector2::zeros(), 0.5, false);

        let pose = drivetrain.pose();
        assert!((pose.heading - 0.5).abs() < 1e-6, "heading = {}", pose.heading);
        assert!(pose.x.abs() < 1e-6 && pose.y.abs() < 1e-6);
    }

    #[test]
    fn test_field_relative_uses_gyro() {
        let (mut drivetrain, _) = ready_drivetrain();
        drivetrain.set_sensor_yaw(90.0).unwrap();
        drivetrain
            .drive(Vector2::new(1.0, 0.0), 0.0, true, false)
            .unwrap();

        for state in drivetrain.module_states().unwrap() {
            // Either pointing robot-right, or robot-left and driving backwards
            let vy = state.speed * state.angle.sin();
            assert!((vy + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_heading_keeps_pose_continuous() {
        let (mut drivetrain, mut now) = ready_drivetrain();
        drive_for(&mut drivetrain, &mut now, 25, Vector2::zeros(), 1.0, false);
        drivetrain.stop().unwrap();
        drivetrain.tick(now, &mut TelemetryFrame::new()).unwrap();
        let before = drivetrain.pose();

        drivetrain.zero_heading().unwrap();
        assert!(drivetrain.heading().unwrap().abs() < 1e-12);
        drivetrain.tick(now, &mut TelemetryFrame::new()).unwrap();

        let after = drivetrain.pose();
        assert!((after.heading - before.heading).abs() < 1e-9);
        assert_eq!(after.x, before.x);
        assert_eq!(after.y, before.y);
    }

    #[test]
    fn test_reset_pose_then_read() {
        let (mut drivetrain, mut now) = ready_drivetrain();
        drive_for(&mut drivetrain, &mut now, 10, Vector2::new(0.5, 0.5), 0.0, false);
        drivetrain.stop().unwrap();
        drivetrain.step_simulation(DT);

        let target = Pose::new(2.0, -1.0, FRAC_PI_2);
        drivetrain.reset_pose(target).unwrap();
        assert_eq!(drivetrain.pose(), target);

        // Stationary ticks after the reset leave it untouched
        for _ in 0..3 {
            drivetrain.tick(now, &mut TelemetryFrame::new()).unwrap();
        }
        let pose = drivetrain.pose();
        assert!((pose.x - 2.0).abs() < 1e-9);
        assert!((pose.y + 1.0).abs() < 1e-9);
        assert!((pose.heading - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_reset_pose_heading_is_wrapped() {
        let (mut drivetrain, now) = ready_drivetrain();
        HolonomicDrive::reset_pose(&mut drivetrain, Pose { x: 1.0, y: 2.0, heading: 3.0 * PI })
            .unwrap();

        let pose = HolonomicDrive::pose(&drivetrain);
        assert!(pose.heading >= -PI && pose.heading < PI, "heading = {}", pose.heading);
        assert!((pose.heading.abs() - PI).abs() < 1e-9);

        drivetrain.tick(now, &mut TelemetryFrame::new()).unwrap();
        let pose = drivetrain.pose();
        assert!(pose.heading >= -PI && pose.heading < PI, "heading = {}", pose.heading);
    }

    #[test]
    fn test_sensor_failure_holds_pose() {
        let (mut drivetrain, mut now) = ready_drivetrain();
        drive_for(&mut drivetrain, &mut now, 10, Vector2::new(1.0, 0.0), 0.0, false);
        let before = drivetrain.pose();

        drivetrain.heading_sensor_mut().set_reads_fail(true);
        drivetrain.step_simulation(DT);
        assert!(drivetrain.tick(now, &mut TelemetryFrame::new()).is_ok());
        assert_eq!(drivetrain.pose(), before);
    }

    #[test]
    fn test_rotate_to_degree_turns_toward_target() {
        let (mut drivetrain, _) = ready_drivetrain();
        let rotation = drivetrain.rotate_to_degree(90.0).unwrap();
        assert!(rotation > 0.0);

        let velocity = drivetrain.robot_relative_velocity().unwrap();
        assert!(velocity.vx.abs() < 1e-9 && velocity.vy.abs() < 1e-9);
        assert!((velocity.omega - rotation).abs() < 1e-9);
    }

    #[test]
    fn test_robot_relative_round_trip() {
        let (mut drivetrain, _) = ready_drivetrain();
        let command = ChassisVelocity::new(0.8, -0.4, 0.6);
        HolonomicDrive::drive_robot_relative(&mut drivetrain, command).unwrap();

        let measured = HolonomicDrive::robot_relative_velocity(&mut drivetrain).unwrap();
        assert!((measured.vx - command.vx).abs() < 1e-9);
        assert!((measured.vy - command.vy).abs() < 1e-9);
        assert!((measured.omega - command.omega).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_gyro() {
        let config = SwerveConfig {
            invert_gyro: true,
            ..square_config()
        };
        let mut drivetrain = sim_drivetrain(config);
        drivetrain.heading_sensor_mut().set_yaw(10.0).unwrap();
        assert!((drivetrain.heading().unwrap().to_degrees() - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_telemetry_per_tick() {
        let (mut drivetrain, now) = ready_drivetrain();
        drivetrain.heading_sensor_mut().set_tilt(2.0, -1.0);
        let mut frame = TelemetryFrame::new();
        drivetrain.tick(now, &mut frame).unwrap();

        assert_eq!(frame.number("pose/x"), Some(0.0));
        assert_eq!(frame.number("gyro/pitch_deg"), Some(2.0));
        assert_eq!(frame.number("gyro/roll_deg"), Some(-1.0));
        for i in 0..NUM_MODULES {
            assert!(frame.number(&format!("module/{}/absolute_deg", i)).is_some());
            assert!(frame.number(&format!("module/{}/integrated_deg", i)).is_some());
            assert!(frame.number(&format!("module/{}/velocity", i)).is_some());
            assert!(frame.number(&format!("module/{}/position", i)).is_some());
        }
        // 4 pose entries, state, 3 gyro, 4 per module
        assert_eq!(frame.len(), 1 + 4 + 3 + 4 * NUM_MODULES);
    }
}
