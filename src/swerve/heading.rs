// Closed-loop heading control

use serde::{Deserialize, Serialize};

/// PID gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Discrete PID controller with optional continuous (wrapping) input.
///
/// Integral and derivative history persist between calls until `reset`.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    /// Seconds between calls
    period: f64,
    continuous: Option<(f64, f64)>,
    /// Bound on the integral term's contribution to the output
    max_integral_output: f64,
    integral: f64,
    previous_error: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains, period: f64) -> Self {
        Self {
            gains,
            period,
            continuous: None,
            max_integral_output: 1.0,
            integral: 0.0,
            previous_error: None,
        }
    }

    /// Treat `min` and `max` as the same point, so error takes the shortest way around
    pub fn enable_continuous_input(&mut self, min: f64, max: f64) {
        self.continuous = Some((min, max));
    }

    pub fn set_max_integral_output(&mut self, limit: f64) {
        self.max_integral_output = limit.abs();
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }

    /// Setpoint minus measurement, wrapped when continuous input is enabled
    pub fn error(&self, measurement: f64, setpoint: f64) -> f64 {
        let error = setpoint - measurement;
        match self.continuous {
            Some((min, max)) => {
                let half = (max - min) / 2.0;
                (error + half).rem_euclid(max - min) - half
            }
            None => error,
        }
    }

    pub fn calculate(&mut self, measurement: f64, setpoint: f64) -> f64 {
        let error = self.error(measurement, setpoint);

        if self.gains.ki != 0.0 {
            let limit = self.max_integral_output / self.gains.ki.abs();
            self.integral = (self.integral + error * self.period).clamp(-limit, limit);
        }

        let derivative = match self.previous_error {
            Some(previous) => (error - previous) / self.period,
            None => 0.0,
        };
        self.previous_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }
}

/// Heading controller settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingControlConfig {
    pub gains: PidGains,
    /// Multiplier from PID output (degree units) to angular velocity (rad/s)
    pub output_scale: f64,
    /// Clamp on the commanded angular velocity (rad/s)
    pub max_angular_velocity: f64,
}

impl Default for HeadingControlConfig {
    fn default() -> Self {
        Self {
            gains: PidGains {
                kp: 0.1,
                ki: 0.0008,
                kd: 0.001,
            },
            output_scale: 0.25,
            max_angular_velocity: 10.0,
        }
    }
}

/// Drives the robot heading toward a target by commanding angular velocity
#[derive(Debug, Clone)]
pub struct HeadingController {
    pid: PidController,
    output_scale: f64,
    max_angular_velocity: f64,
}

impl HeadingController {
    pub fn new(config: HeadingControlConfig, period: f64) -> Self {
        let mut pid = PidController::new(config.gains, period);
        pid.enable_continuous_input(-180.0, 180.0);
        Self {
            pid,
            output_scale: config.output_scale,
            max_angular_velocity: config.max_angular_velocity,
        }
    }

    /// Angular velocity (rad/s, CCW positive) that turns `current` toward `target` (both degrees).
    ///
    /// Does not terminate at a tolerance; the caller decides when to stop.
    pub fn rotate_toward(&mut self, current: f64, target: f64) -> f64 {
        let output = self.pid.calculate(current, target);
        (self.output_scale * output).clamp(-self.max_angular_velocity, self.max_angular_velocity)
    }

    /// Forget integral and derivative history
    pub fn reset(&mut self) {
        self.pid.reset();
    }
}
