// src/hardware/temperature.rs - PID temperature controller
use crate::config::ControllerConfig;
use serde::{Deserialize, Serialize};

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl From<&ControllerConfig> for PidGains {
    fn from(config: &ControllerConfig) -> Self {
        Self::new(config.kp, config.ki, config.kd)
    }
}

impl std::fmt::Display for PidGains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Kp={}, Ki={}, Kd={}", self.kp, self.ki, self.kd)
    }
}

/// Result of one controller update, split into its terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    pub output: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    setpoint: f64,

    /// PID state
    integral: f64,
    previous_error: f64,

    /// Output clamp used for anti-windup, `None` leaves the output unbounded.
    limits: Option<(f64, f64)>,
}

impl PidController {
    pub fn new(gains: PidGains, setpoint: f64) -> Self {
        Self {
            gains,
            setpoint,
            integral: 0.0,
            previous_error: 0.0,
            limits: None,
        }
    }

    /// Controller as described by a config section. Limits only apply with anti-windup on.
    pub fn from_config(config: &ControllerConfig, setpoint: f64) -> Self {
        let pid = Self::new(PidGains::from(config), setpoint);
        if config.anti_windup {
            pid.with_limits(config.output_min, config.output_max)
        } else {
            pid
        }
    }

    /// Clamp the output and stop integrating while saturated.
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some((min, max));
        self
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        if setpoint != self.setpoint {
            tracing::debug!("Setting target temperature: {:.1}°C", setpoint);
        }
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Calculate the control output for a new measurement taken `dt` seconds after the last one.
    ///
    /// The derivative uses the previous error, which is zero before the first
    /// update, so the very first call sees a derivative kick of `kd * error / dt`.
    pub fn update(&mut self, measured: f64, dt: f64) -> PidOutput {
        let error = self.setpoint - measured;

        let p = self.gains.kp * error;

        self.integral += error * dt;
        let mut i = self.gains.ki * self.integral;

        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        let d = self.gains.kd * derivative;

        self.previous_error = error;

        let mut output = p + i + d;
        if let Some((min, max)) = self.limits {
            let clamped = output.clamp(min, max);
            if clamped != output {
                // saturated: undo this step's integration
                self.integral -= error * dt;
                i = self.gains.ki * self.integral;
            }
            output = clamped;
        }

        PidOutput { output, p, i, d }
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }
}
