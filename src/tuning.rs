//! Relay auto-tuning.
//!
//! The heater is driven bang-bang around the target, the same experiment
//! printer firmware runs for its PID autotune. The resulting limit cycle gives
//! the ultimate gain `Ku = 4d / (pi * a)` (relay amplitude `d`, oscillation
//! amplitude `a`) and the ultimate period `Tu`, which are turned into gains
//! with one of the classic tuning rules.

use crate::config::{Config, TuningConfig, TuningRule};
use crate::error::{SimError, SimResult};
use crate::hardware::hardware_traits::{TemperatureSensor, ThermalPlant};
use crate::hardware::temperature::PidGains;
use crate::hardware::thermal::{HotendModel, Thermistor};
use serde::Serialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneResult {
    pub ultimate_gain: f64,
    pub ultimate_period: f64,
    /// Half the mean peak-to-trough swing of the measured temperature.
    pub amplitude: f64,
    pub cycles: usize,
    pub rule: TuningRule,
    pub gains: PidGains,
}

/// Gains from the ultimate gain and period.
pub fn gains_for_rule(ku: f64, tu: f64, rule: TuningRule) -> PidGains {
    match rule {
        TuningRule::ZieglerNichols => PidGains::new(0.6 * ku, 1.2 * ku / tu, 0.075 * ku * tu),
        TuningRule::PiOnly => PidGains::new(0.45 * ku, 0.54 * ku / tu, 0.0),
        TuningRule::POnly => PidGains::new(0.5 * ku, 0.0, 0.0),
        TuningRule::NoOvershoot => PidGains::new(0.2 * ku, 0.4 * ku / tu, ku * tu / 15.0),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Run a relay experiment on `plant` around `target` and derive PID gains.
pub fn auto_tune<P: ThermalPlant, S: TemperatureSensor>(
    plant: &mut P,
    sensor: &mut S,
    target: f64,
    config: &TuningConfig,
    dt: f64,
) -> SimResult<TuneResult> {
    let high = target + config.hysteresis;
    let low = target - config.hysteresis;
    let steps = (config.max_time / dt).ceil() as usize;

    tracing::info!(
        "Auto-tune: relay {}% around {:.1}°C ±{}, {} cycles",
        config.relay_power,
        target,
        config.hysteresis,
        config.cycles
    );

    let mut heating = true;
    let mut phase_max = f64::NEG_INFINITY;
    let mut phase_min = f64::INFINITY;
    let mut on_times: Vec<f64> = Vec::new();
    let mut peaks: Vec<f64> = Vec::new();
    let mut troughs: Vec<f64> = Vec::new();

    for k in 0..steps {
        let time = k as f64 * dt;
        let measured = sensor.read(plant.temperature(), dt);
        phase_max = phase_max.max(measured);
        phase_min = phase_min.min(measured);

        if heating && measured > high {
            heating = false;
            // the very first heating phase starts cold and has no meaningful trough
            if !on_times.is_empty() {
                troughs.push(phase_min);
            }
            phase_max = measured;
        } else if !heating && measured < low {
            heating = true;
            peaks.push(phase_max);
            on_times.push(time);
            phase_min = measured;
            tracing::debug!(
                "Auto-tune cycle {} at t={:.1}s, peak {:.2}°C",
                on_times.len(),
                time,
                phase_max
            );
            if on_times.len() > config.cycles {
                break;
            }
        }

        let power = if heating { config.relay_power } else { 0.0 };
        plant.update(power, dt);
    }

    if on_times.len() <= config.cycles || troughs.is_empty() {
        return Err(SimError::TuneFailed(format!(
            "no sustained oscillation around {:.1}°C within {}s ({} cycles seen)",
            target,
            config.max_time,
            on_times.len().saturating_sub(1)
        )));
    }

    let ultimate_period =
        (on_times[on_times.len() - 1] - on_times[0]) / (on_times.len() - 1) as f64;
    let amplitude = (mean(&peaks) - mean(&troughs)) / 2.0;
    if !(amplitude > 0.0) || !(ultimate_period > 0.0) {
        return Err(SimError::TuneFailed(format!(
            "degenerate oscillation: amplitude {amplitude:.3}, period {ultimate_period:.3}s"
        )));
    }

    let relay_amplitude = config.relay_power / 2.0;
    let ultimate_gain = 4.0 * relay_amplitude / (PI * amplitude);
    let gains = gains_for_rule(ultimate_gain, ultimate_period, config.rule);

    tracing::info!(
        "Auto-tuned PID: Kp={:.3}, Ki={:.3}, Kd={:.3} (Ku={:.3}, Tu={:.2}s)",
        gains.kp,
        gains.ki,
        gains.kd,
        ultimate_gain,
        ultimate_period
    );

    Ok(TuneResult {
        ultimate_gain,
        ultimate_period,
        amplitude,
        cycles: on_times.len() - 1,
        rule: config.rule,
        gains,
    })
}

/// Auto-tune the hotend described by `config` at its configured target temperature.
pub fn auto_tune_config(config: &Config) -> SimResult<TuneResult> {
    let mut plant = HotendModel::new(&config.plant);
    let mut sensor = Thermistor::new(config.plant.initial_temp, &config.sensor);
    auto_tune(
        &mut plant,
        &mut sensor,
        config.simulation.target_temp,
        &config.tuning,
        config.simulation.dt,
    )
}
