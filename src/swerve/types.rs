// Value types shared by every swerve component
//
// All angles are radians unless a name says otherwise. Wrapped angles live in [-PI, PI).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Number of swerve modules on the chassis
pub const NUM_MODULES: usize = 4;

/// Module indices, shared by geometry, states and positions
pub const MODULE_FRONT_LEFT: usize = 0;
pub const MODULE_FRONT_RIGHT: usize = 1;
pub const MODULE_BACK_LEFT: usize = 2;
pub const MODULE_BACK_RIGHT: usize = 3;

/// Wrap an angle into [-PI, PI)
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    // rem_euclid can round up to exactly 2*PI for tiny negative inputs
    if wrapped >= PI { wrapped - 2.0 * PI } else { wrapped }
}

/// Robot-frame velocity: forward m/s, strafe m/s (left positive), rad/s (CCW positive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert a field-frame command into the robot frame given the robot heading
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: f64) -> Self {
        // Rotate by -heading
        let (sin, cos) = heading.sin_cos();
        Self {
            vx: vx * cos + vy * sin,
            vy: -vx * sin + vy * cos,
            omega,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}

/// Target or measured state of one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel speed in m/s
    pub speed: f64,
    /// Wrapped steering angle
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self {
            speed,
            angle: wrap_angle(angle),
        }
    }
}

/// Cumulative wheel travel of one module and its current steering angle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: f64,
}

impl ModulePosition {
    pub fn new(distance: f64, angle: f64) -> Self {
        Self {
            distance,
            angle: wrap_angle(angle),
        }
    }
}

/// Field-frame robot pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Wrapped heading
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: wrap_angle(heading),
        }
    }

    /// Apply a robot-frame twist using the SE(2) exponential map.
    ///
    /// The resulting heading is `self.heading + dtheta`; callers that know the
    /// true heading overwrite it afterwards.
    pub fn exp(&self, dx: f64, dy: f64, dtheta: f64) -> Pose {
        let (sin_t, cos_t) = dtheta.sin_cos();
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_t / dtheta, (1.0 - cos_t) / dtheta)
        };

        let local_x = dx * s - dy * c;
        let local_y = dx * c + dy * s;

        let (sin_h, cos_h) = self.heading.sin_cos();
        Pose::new(
            self.x + local_x * cos_h - local_y * sin_h,
            self.y + local_x * sin_h + local_y * cos_h,
            self.heading + dtheta,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_wrap_angle_range() {
        assert!((wrap_angle(PI) + PI).abs() < EPS, "PI wraps to -PI");
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < EPS);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < EPS);
        assert!(wrap_angle(-1e-18) < PI);

        for i in -720..720 {
            let a = wrap_angle((i as f64).to_radians());
            assert!((-PI..PI).contains(&a), "{} out of range", a);
        }
    }

    #[test]
    fn test_field_relative_rotation() {
        // Robot facing +90 deg: field-forward is robot-right
        let v = ChassisVelocity::from_field_relative(1.0, 0.0, 0.5, PI / 2.0);
        assert!(v.vx.abs() < EPS);
        assert!((v.vy + 1.0).abs() < EPS);
        assert_eq!(v.omega, 0.5);
    }

    #[test]
    fn test_pose_exp_straight_line() {
        let pose = Pose::new(1.0, 2.0, PI / 2.0);
        let moved = pose.exp(1.0, 0.0, 0.0);
        assert!((moved.x - 1.0).abs() < EPS);
        assert!((moved.y - 3.0).abs() < EPS);
    }

    #[test]
    fn test_pose_exp_quarter_arc() {
        // Arc length PI/2 on a unit circle while turning 90 deg
        let moved = Pose::default().exp(PI / 2.0, 0.0, PI / 2.0);
        assert!((moved.x - 1.0).abs() < 1e-9);
        assert!((moved.y - 1.0).abs() < 1e-9);
        assert!((moved.heading - PI / 2.0).abs() < 1e-9);
    }
}
