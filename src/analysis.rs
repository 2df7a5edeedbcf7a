//! Step-response metrics computed from a simulation trace.

use crate::config::AnalysisConfig;
use crate::error::{SimError, SimResult};
use crate::simulator::{Sample, SimulationTrace};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// Seconds until the temperature entered and stayed in the tolerance band.
    pub settling_time: Option<f64>,
    /// Peak temperature minus the initial setpoint. Negative when the target is never reached.
    pub overshoot: f64,
    pub overshoot_percent: f64,
    /// Mean squared error over the whole run.
    pub mse: f64,
    /// Seconds from 10% to 90% of the initial step.
    pub rise_time: Option<f64>,
    pub steady_state_error: f64,
    pub peak_power: f64,
    pub runaway: bool,
}

/// Index of the first sample from which `window` consecutive samples stay
/// within `band` of their setpoint. The window is cut short at the end of the trace.
fn settling_index(samples: &[Sample], band: f64, window: usize) -> Option<usize> {
    (0..samples.len()).find(|&start| {
        let end = (start + window).min(samples.len());
        samples[start..end].iter().all(|s| s.error().abs() <= band)
    })
}

fn first_time_at_or_above(samples: &[Sample], level: f64) -> Option<f64> {
    samples.iter().find(|s| s.temperature >= level).map(|s| s.time)
}

/// 10-90% rise time for a heating step. `None` for cooling steps or when 90% is never reached.
fn rise_time(samples: &[Sample], setpoint: f64) -> Option<f64> {
    let start = samples.first()?.temperature;
    let span = setpoint - start;
    if span <= 0.0 {
        return None;
    }
    let t10 = first_time_at_or_above(samples, start + 0.1 * span)?;
    let t90 = first_time_at_or_above(samples, start + 0.9 * span)?;
    Some(t90 - t10)
}

/// Compute the performance metrics of a run against its initial setpoint.
pub fn analyse(trace: &SimulationTrace, config: &AnalysisConfig) -> SimResult<PerformanceReport> {
    let samples = &trace.samples;
    let first = samples.first().ok_or(SimError::EmptyTrace)?;
    let last = samples.last().ok_or(SimError::EmptyTrace)?;
    let setpoint = first.setpoint;

    let band = setpoint.abs() * config.tolerance;
    let settling_time = settling_index(samples, band, config.window).map(|i| samples[i].time);

    let peak = samples
        .iter()
        .map(|s| s.temperature)
        .fold(f64::NEG_INFINITY, f64::max);
    let overshoot = peak - setpoint;
    let overshoot_percent = if setpoint != 0.0 {
        overshoot / setpoint * 100.0
    } else {
        0.0
    };

    let mse = samples.iter().map(|s| s.error().powi(2)).sum::<f64>() / samples.len() as f64;

    let peak_power = samples.iter().map(|s| s.heater_power).fold(0.0, f64::max);

    Ok(PerformanceReport {
        settling_time,
        overshoot,
        overshoot_percent,
        mse,
        rise_time: rise_time(samples, setpoint),
        steady_state_error: last.error(),
        peak_power,
        runaway: trace.runaway_detected(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::temperature::PidGains;
    use chrono::Utc;
    use uuid::Uuid;

    fn trace_from(temps: &[f64], setpoint: f64) -> SimulationTrace {
        let samples = temps
            .iter()
            .enumerate()
            .map(|(k, &temperature)| Sample {
                time: k as f64,
                setpoint,
                temperature,
                measured: temperature,
                heater_power: 50.0,
                p: 0.0,
                i: 0.0,
                d: 0.0,
            })
            .collect();
        SimulationTrace {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            name: "test".to_string(),
            gains: PidGains::new(1.0, 0.0, 0.0),
            dt: 1.0,
            samples,
            events: Vec::new(),
        }
    }

    #[test]
    fn test_empty_trace_is_an_error() {
        let trace = trace_from(&[], 100.0);
        assert!(matches!(
            analyse(&trace, &AnalysisConfig::default()),
            Err(SimError::EmptyTrace)
        ));
    }

    #[test]
    fn test_settling_requires_full_window() {
        // Enters the 2% band at t=2, leaves at t=4, re-enters for good at t=5.
        let temps = [0.0, 50.0, 99.0, 101.0, 90.0, 100.5, 100.0, 99.5, 100.0];
        let config = AnalysisConfig { tolerance: 0.02, window: 3 };
        let report = analyse(&trace_from(&temps, 100.0), &config).unwrap();
        assert_eq!(report.settling_time, Some(5.0));
    }

    #[test]
    fn test_settled_from_first_sample() {
        let temps = [100.0, 100.0, 100.0];
        let report = analyse(&trace_from(&temps, 100.0), &AnalysisConfig::default()).unwrap();
        assert_eq!(report.settling_time, Some(0.0));
        assert_eq!(report.mse, 0.0);
        assert_eq!(report.rise_time, None);
    }

    #[test]
    fn test_never_settles() {
        let temps = [0.0, 10.0, 20.0, 30.0];
        let report = analyse(&trace_from(&temps, 100.0), &AnalysisConfig::default()).unwrap();
        assert_eq!(report.settling_time, None);
        assert_eq!(report.overshoot, -70.0);
        assert_eq!(report.steady_state_error, 70.0);
    }

    #[test]
    fn test_overshoot_and_mse() {
        let temps = [0.0, 110.0, 100.0, 100.0];
        let report = analyse(&trace_from(&temps, 100.0), &AnalysisConfig::default()).unwrap();
        assert_eq!(report.overshoot, 10.0);
        assert_eq!(report.overshoot_percent, 10.0);
        // (100^2 + 10^2) / 4
        assert_eq!(report.mse, 2525.0);
        assert_eq!(report.rise_time, Some(0.0));
        assert_eq!(report.peak_power, 50.0);
        assert!(!report.runaway);
    }
}
