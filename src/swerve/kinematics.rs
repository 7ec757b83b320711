// Swerve inverse and forward kinematics
// Converts robot-frame chassis velocities to per-module (speed, angle) targets and back.

use nalgebra::{Matrix3, Vector2, Vector3};

use super::types::{ChassisVelocity, ModulePosition, ModuleState, NUM_MODULES};

/// Error types for kinematics construction
#[derive(Debug, thiserror::Error)]
pub enum KinematicsError {
    #[error("Module geometry is degenerate: all modules share the same contact point")]
    DegenerateGeometry,
}

/// Robot-frame displacement recovered from module displacements
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Kinematics for a fixed four-module footprint
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    modules: [Vector2<f64>; NUM_MODULES],
    /// Inverse of the least-squares normal matrix (A^T A)^-1
    normal_inverse: Matrix3<f64>,
    /// Angles from the last non-zero command, held while stopped
    last_angles: [f64; NUM_MODULES],
}

impl SwerveKinematics {
    /// Build kinematics from module offsets (metres, robot frame, relative to the rotation centre)
    pub fn new(modules: [Vector2<f64>; NUM_MODULES]) -> Result<Self, KinematicsError> {
        // Each module contributes rows [1, 0, -y] and [0, 1, x] to A
        let n = NUM_MODULES as f64;
        let sum_x: f64 = modules.iter().map(|m| m.x).sum();
        let sum_y: f64 = modules.iter().map(|m| m.y).sum();
        let sum_sq: f64 = modules.iter().map(|m| m.norm_squared()).sum();

        let normal = Matrix3::new(n, 0.0, -sum_y, 0.0, n, sum_x, -sum_y, sum_x, sum_sq);

        // Singular only when every module sits on the same point
        if normal.determinant().abs() < 1e-12 {
            return Err(KinematicsError::DegenerateGeometry);
        }
        let normal_inverse = normal
            .try_inverse()
            .ok_or(KinematicsError::DegenerateGeometry)?;

        Ok(Self {
            modules,
            normal_inverse,
            last_angles: [0.0; NUM_MODULES],
        })
    }

    /// Module offsets in index order
    pub fn modules(&self) -> &[Vector2<f64>; NUM_MODULES] {
        &self.modules
    }

    /// Convert a chassis velocity into module targets.
    ///
    /// Field-relative commands are rotated into the robot frame using `heading` first.
    /// A zero command keeps every module at its previous angle with zero speed.
    pub fn to_module_states(
        &mut self,
        velocity: ChassisVelocity,
        field_relative: bool,
        heading: f64,
    ) -> [ModuleState; NUM_MODULES] {
        let velocity = if field_relative {
            ChassisVelocity::from_field_relative(velocity.vx, velocity.vy, velocity.omega, heading)
        } else {
            velocity
        };

        if velocity.is_zero() {
            return self.last_angles.map(|angle| ModuleState { speed: 0.0, angle });
        }

        let mut states = [ModuleState::default(); NUM_MODULES];
        for (i, offset) in self.modules.iter().enumerate() {
            // v_i = v + omega x r_i
            let vx = velocity.vx - velocity.omega * offset.y;
            let vy = velocity.vy + velocity.omega * offset.x;

            let speed = vx.hypot(vy);
            let angle = if speed > 0.0 {
                vy.atan2(vx)
            } else {
                // Module sits on the instantaneous centre of rotation
                self.last_angles[i]
            };

            states[i] = ModuleState::new(speed, angle);
            self.last_angles[i] = states[i].angle;
        }

        states
    }

    /// Least-squares chassis velocity from measured module states
    pub fn to_chassis_velocity(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisVelocity {
        let solved = self.solve(states.map(|s| (s.speed, s.angle)));
        ChassisVelocity::new(solved.x, solved.y, solved.z)
    }

    /// Robot-frame twist from per-module displacements (distance delta at the current angle)
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist {
        let solved = self.solve(deltas.map(|d| (d.distance, d.angle)));
        Twist {
            dx: solved.x,
            dy: solved.y,
            dtheta: solved.z,
        }
    }

    fn solve(&self, polar: [(f64, f64); NUM_MODULES]) -> Vector3<f64> {
        // A^T b, with b the stacked per-module (x, y) components
        let mut atb = Vector3::zeros();
        for ((magnitude, angle), offset) in polar.iter().zip(self.modules.iter()) {
            let (sin, cos) = angle.sin_cos();
            let bx = magnitude * cos;
            let by = magnitude * sin;
            atb.x += bx;
            atb.y += by;
            atb.z += -offset.y * bx + offset.x * by;
        }
        self.normal_inverse * atb
    }
}

/// Scale all module speeds by the same factor so none exceeds `max_speed`.
///
/// Speeds already within the limit are left untouched.
pub fn desaturate_wheel_speeds(states: &mut [ModuleState; NUM_MODULES], max_speed: f64) {
    let max_observed = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

    if max_observed > max_speed {
        let scale = max_speed / max_observed;
        for state in states.iter_mut() {
            state.speed *= scale;
        }
    }
}
