// 50 Hz loop with watchdog
// Note: the watchdog stops the robot when commands stop arriving, e.g. if teleop crashes
// or a path follower hangs mid-trajectory.

use nalgebra::Vector2;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::commands::{CommandRegistry, DriveAction};
use crate::config::{
    loop_period, SwerveConfig, CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_ACTION, TOPIC_CMD_CHASSIS,
    TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_POSE, TOPIC_TELEMETRY_PREFIX,
};
use crate::messages::{ActionCommand, DriveCommand, PoseMessage, RuntimeHealth};
use crate::swerve::sim::{SimHeadingSensor, SimModuleDriver};
use crate::swerve::{
    ChassisVelocity, Drivetrain, HeadingSensor, ModuleDriver, Pose, SwerveError, NUM_MODULES,
};
use crate::telemetry::TelemetryFrame;

pub struct Runtime<D: ModuleDriver, G: HeadingSensor> {
    drivetrain: Drivetrain<D, G>,
    registry: CommandRegistry,
    latest_cmd: Option<(DriveCommand, Instant)>,
    latest_chassis: Option<(ChassisVelocity, Instant)>,
    heading_target: Option<f64>,
    health: RuntimeHealth,
}

impl<D: ModuleDriver, G: HeadingSensor> Runtime<D, G> {
    pub fn new(drivetrain: Drivetrain<D, G>, registry: CommandRegistry) -> Self {
        Self {
            drivetrain,
            registry,
            latest_cmd: None,
            latest_chassis: None,
            heading_target: None,
            health: RuntimeHealth::Calibrating, // Start calibrating until modules are synced
        }
    }

    pub fn drivetrain(&self) -> &Drivetrain<D, G> {
        &self.drivetrain
    }

    pub fn drivetrain_mut(&mut self) -> &mut Drivetrain<D, G> {
        &mut self.drivetrain
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn heading_target(&self) -> Option<f64> {
        self.heading_target
    }

    /// Process incoming operator command
    pub fn on_drive_command(&mut self, cmd: DriveCommand, now: Instant) {
        debug!("Received drive command: {:?}", &cmd);
        // Any real driving input takes over from heading hold
        if !cmd.is_zero() && self.heading_target.take().is_some() {
            info!("Heading hold released by drive command");
        }
        self.latest_cmd = Some((cmd, now));
    }

    /// Process robot-relative command from a path follower
    pub fn on_chassis_command(&mut self, velocity: ChassisVelocity, now: Instant) {
        debug!("Received chassis command: {:?}", &velocity);
        self.latest_chassis = Some((velocity, now));
    }

    /// Process a one-shot action
    pub fn on_action(&mut self, action: ActionCommand) -> Result<(), SwerveError> {
        info!("Received action: {:?}", &action);
        match action {
            ActionCommand::Named { name } => match self.registry.get(&name) {
                Some(action) => self.execute(action),
                None => {
                    warn!("Unknown named command '{}'", name);
                    Ok(())
                }
            },
            ActionCommand::ResetPose { x, y, heading_deg } => self
                .drivetrain
                .reset_pose(Pose::new(x, y, heading_deg.to_radians())),
            ActionCommand::SetYaw { degrees } => self.drivetrain.set_sensor_yaw(degrees),
        }
    }

    fn execute(&mut self, action: DriveAction) -> Result<(), SwerveError> {
        match action {
            DriveAction::ZeroHeading => self.drivetrain.zero_heading(),
            DriveAction::SetYaw(degrees) => self.drivetrain.set_sensor_yaw(degrees),
            DriveAction::Stop => {
                self.latest_cmd = None;
                self.latest_chassis = None;
                self.heading_target = None;
                if self.drivetrain.is_ready() {
                    self.drivetrain.stop()?;
                }
                Ok(())
            }
            DriveAction::HoldHeading(degrees) => {
                self.drivetrain.reset_heading_controller();
                self.heading_target = Some(degrees);
                Ok(())
            }
            DriveAction::ReleaseHeading => {
                self.heading_target = None;
                Ok(())
            }
        }
    }

    fn fresh<T: Copy>(entry: Option<(T, Instant)>, now: Instant) -> Option<T> {
        entry.and_then(|(value, at)| {
            (now.saturating_duration_since(at) <= CMD_TIMEOUT).then_some(value)
        })
    }

    /// Apply the active command to the drivetrain based on watchdog state
    fn actuate(&mut self, now: Instant) -> Result<RuntimeHealth, SwerveError> {
        if let Some(target) = self.heading_target {
            self.drivetrain.rotate_to_degree(target)?;
            return Ok(RuntimeHealth::Ok);
        }

        // A path follower takes priority over the operator while it is streaming
        if let Some(velocity) = Self::fresh(self.latest_chassis, now) {
            self.drivetrain.drive_robot_relative(velocity)?;
            return Ok(RuntimeHealth::Ok);
        }

        if let Some(cmd) = Self::fresh(self.latest_cmd, now) {
            self.drivetrain.drive(
                Vector2::new(cmd.x_vel, cmd.y_vel),
                cmd.theta_vel,
                cmd.field_relative,
                cmd.open_loop,
            )?;
            return Ok(RuntimeHealth::Ok);
        }

        // Watchdog triggered (or nothing received yet) - stop the robot
        if self.health == RuntimeHealth::Ok {
            warn!("Commands stale (> {:?}), stopping robot", CMD_TIMEOUT);
        }
        self.drivetrain.stop()?;
        Ok(RuntimeHealth::CmdStale)
    }

    /// One control cycle: actuate, then sample odometry and telemetry.
    ///
    /// Only fatal conditions (calibration failure) are returned as errors.
    pub fn step(
        &mut self,
        now: Instant,
        telemetry: &mut TelemetryFrame,
    ) -> Result<RuntimeHealth, SwerveError> {
        if self.drivetrain.is_ready() {
            match self.actuate(now) {
                Ok(health) => self.health = health,
                Err(e) => warn!("Actuation failed this tick: {}", e),
            }
        } else {
            self.health = RuntimeHealth::Calibrating;
        }

        self.drivetrain.tick(now, telemetry)?;
        if self.health == RuntimeHealth::Calibrating && self.drivetrain.is_ready() {
            // Ready from this tick on; actuation starts next tick
            self.health = RuntimeHealth::CmdStale;
        }

        telemetry.put_string("runtime/health", self.health.as_str());
        Ok(self.health)
    }
}

/// Build a drivetrain on simulated hardware
pub fn sim_drivetrain(
    config: SwerveConfig,
) -> Result<Drivetrain<SimModuleDriver, SimHeadingSensor>, SwerveError> {
    let drivers: [SimModuleDriver; NUM_MODULES] = std::array::from_fn(|i| {
        SimModuleDriver::new(i, config.max_speed, config.angle_offsets_deg[i].to_radians())
    });
    Drivetrain::new(config, drivers, SimHeadingSensor::new())
}

pub async fn run(config: SwerveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_chassis = session.declare_subscriber(TOPIC_CMD_CHASSIS).await?;
    let sub_action = session.declare_subscriber(TOPIC_CMD_ACTION).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // Physical module drivers live outside this crate; run against simulated hardware
    let mut drivetrain = sim_drivetrain(config)?;
    drivetrain.begin_calibration(Instant::now())?;
    let mut runtime = Runtime::new(drivetrain, CommandRegistry::with_defaults());
    info!("Named commands: {:?}", runtime.registry.names());

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut telemetry = TelemetryFrame::new();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_DRIVE, TOPIC_CMD_CHASSIS, TOPIC_CMD_ACTION
    );
    info!(
        "Publishing to: {}, {}, {}/*",
        TOPIC_POSE, TOPIC_HEALTH, TOPIC_TELEMETRY_PREFIX
    );

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending messages (non-blocking), keep latest commands
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_drive_command(cmd, now),
                Err(e) => warn!("Failed to parse drive command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_chassis.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ChassisVelocity>(&payload) {
                Ok(velocity) => runtime.on_chassis_command(velocity, now),
                Err(e) => warn!("Failed to parse chassis command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_action.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ActionCommand>(&payload) {
                Ok(action) => {
                    if let Err(e) = runtime.on_action(action) {
                        warn!("Action failed: {}", e);
                    }
                }
                Err(e) => warn!("Failed to parse action: {}", e),
            }
        }

        // 2. Advance simulated hardware by one period
        runtime.drivetrain_mut().step_simulation(loop_period());

        // 3. Actuate, update odometry (calibration failure is fatal)
        let health = runtime.step(now, &mut telemetry)?;

        // 4. Publish pose, health and telemetry
        let pose_json = serde_json::to_string(&PoseMessage::from(runtime.drivetrain().pose()))?;
        pub_pose.put(pose_json).await?;

        let health_json = serde_json::to_string(&health)?;
        pub_health.put(health_json).await?;

        for (key, value) in telemetry.drain() {
            let value_json = serde_json::to_string(&value)?;
            session
                .put(format!("{}/{}", TOPIC_TELEMETRY_PREFIX, key), value_json)
                .await?;
        }
    }
}
