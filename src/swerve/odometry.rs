// Dead-reckoning pose estimate
//
// Wheels contribute translation only. Rotation always comes from the heading sensor,
// so wheel slip cannot accumulate into heading drift.

use super::kinematics::SwerveKinematics;
use super::types::{wrap_angle, ModulePosition, Pose, NUM_MODULES};

/// Running field-frame pose fused from module travel and heading readings
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: Pose,
    /// Pose heading minus sensor heading
    heading_offset: f64,
    /// Pose-frame heading at the previous sample
    previous_heading: f64,
    previous_positions: [ModulePosition; NUM_MODULES],
}

impl SwerveOdometry {
    /// Start at `initial_pose` with the given sensor heading and module positions as reference
    pub fn new(
        kinematics: SwerveKinematics,
        heading: f64,
        positions: [ModulePosition; NUM_MODULES],
        initial_pose: Pose,
    ) -> Self {
        let initial_pose = Pose::new(initial_pose.x, initial_pose.y, initial_pose.heading);
        Self {
            kinematics,
            pose: initial_pose,
            heading_offset: initial_pose.heading - heading,
            previous_heading: initial_pose.heading,
            previous_positions: positions,
        }
    }

    /// Latest pose estimate
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Integrate one sample and return the new pose
    pub fn update(&mut self, heading: f64, positions: [ModulePosition; NUM_MODULES]) -> Pose {
        let angle = wrap_angle(heading + self.heading_offset);

        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for (delta, (current, previous)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(self.previous_positions.iter()))
        {
            *delta = ModulePosition {
                distance: current.distance - previous.distance,
                angle: current.angle,
            };
        }

        let twist = self.kinematics.to_twist(&deltas);
        let dtheta = wrap_angle(angle - self.previous_heading);

        let mut pose = self.pose.exp(twist.dx, twist.dy, dtheta);
        pose.heading = angle;

        self.pose = pose;
        self.previous_heading = angle;
        self.previous_positions = positions;
        pose
    }

    /// Overwrite the pose and the reference sample together. The heading is wrapped.
    pub fn reset_pose(
        &mut self,
        heading: f64,
        positions: [ModulePosition; NUM_MODULES],
        pose: Pose,
    ) {
        let pose = Pose::new(pose.x, pose.y, pose.heading);
        self.pose = pose;
        self.heading_offset = pose.heading - heading;
        self.previous_heading = pose.heading;
        self.previous_positions = positions;
    }

    /// Keep the pose heading continuous after the sensor heading was re-zeroed
    pub fn rebase_heading(&mut self, new_heading: f64) {
        self.heading_offset = self.previous_heading - new_heading;
    }
}
