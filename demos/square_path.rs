// Path follower client: drives a 1 m square through the chassis command topic
//
// Start the runtime first, then run this. The pose published by the runtime closes the loop.

use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use swerve_zenoh_runtime::config::{LOOP_HZ, TOPIC_CMD_ACTION, TOPIC_CMD_CHASSIS, TOPIC_POSE};
use swerve_zenoh_runtime::messages::{ActionCommand, PoseMessage};
use swerve_zenoh_runtime::swerve::{wrap_angle, ChassisVelocity};

const WAYPOINTS: [(f64, f64); 4] = [(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)];
const TRANSLATION_GAIN: f64 = 2.0; // (m/s) per m of error
const HEADING_GAIN: f64 = 3.0; // (rad/s) per rad of error
const MAX_SPEED: f64 = 0.8; // m/s
const TOLERANCE: f64 = 0.05; // m
const LEG_TIMEOUT: Duration = Duration::from_secs(10);

/// Field-frame proportional step toward `target`, converted to the robot frame
fn follow(pose: &PoseMessage, target: (f64, f64)) -> ChassisVelocity {
    let (ex, ey) = (target.0 - pose.x, target.1 - pose.y);
    let mut vx = TRANSLATION_GAIN * ex;
    let mut vy = TRANSLATION_GAIN * ey;
    let speed = vx.hypot(vy);
    if speed > MAX_SPEED {
        vx *= MAX_SPEED / speed;
        vy *= MAX_SPEED / speed;
    }

    let heading = pose.heading_deg.to_radians();
    let omega = HEADING_GAIN * wrap_angle(-heading);
    ChassisVelocity::from_field_relative(vx, vy, omega, heading)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_chassis = session.declare_publisher(TOPIC_CMD_CHASSIS).await?;
    let pub_action = session.declare_publisher(TOPIC_CMD_ACTION).await?;
    let sub_pose = session.declare_subscriber(TOPIC_POSE).await?;

    let actions = [
        ActionCommand::Named {
            name: "release_heading".to_string(),
        },
        ActionCommand::ResetPose {
            x: 0.0,
            y: 0.0,
            heading_deg: 0.0,
        },
    ];
    for action in &actions {
        pub_action.put(serde_json::to_string(action)?).await?;
    }

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let mut pose: Option<PoseMessage> = None;

    for (leg, target) in WAYPOINTS.iter().enumerate() {
        info!("Leg {}: heading for ({:.1}, {:.1})", leg, target.0, target.1);
        let started = Instant::now();

        loop {
            tick.tick().await;
            while let Ok(Some(sample)) = sub_pose.try_recv() {
                match serde_json::from_slice::<PoseMessage>(&sample.payload().to_bytes()) {
                    Ok(latest) => pose = Some(latest),
                    Err(e) => warn!("Failed to parse pose: {}", e),
                }
            }

            // Nothing to close the loop on until the runtime is publishing
            let Some(current) = pose else { continue };
            if (target.0 - current.x).hypot(target.1 - current.y) < TOLERANCE {
                info!("Reached ({:.2}, {:.2})", current.x, current.y);
                break;
            }
            if started.elapsed() > LEG_TIMEOUT {
                warn!("Leg {} timed out at ({:.2}, {:.2})", leg, current.x, current.y);
                break;
            }

            let command = follow(&current, *target);
            pub_chassis.put(serde_json::to_string(&command)?).await?;
        }
    }

    let stop = ActionCommand::Named {
        name: "stop".to_string(),
    };
    pub_action.put(serde_json::to_string(&stop)?).await?;
    info!("Square complete");
    Ok(())
}
