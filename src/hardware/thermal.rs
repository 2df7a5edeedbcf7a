// src/hardware/thermal.rs - Hotend thermal model, thermistor and runaway protection
use crate::config::{PlantConfig, RunawayConfig, SensorConfig};
use crate::hardware::hardware_traits::{TemperatureSensor, ThermalPlant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Lumped first-order model of a hotend.
///
/// The heater adds `power / heat_capacity` degrees per second and the block
/// loses heat to the ambient air in proportion to the temperature difference:
///
/// `dT/dt = power / C - (k + k_fan) * (T - T_ambient)`
///
/// integrated with an explicit Euler step.
#[derive(Debug, Clone)]
pub struct HotendModel {
    temperature: f64,
    ambient: f64,
    heat_capacity: f64,
    cooling_rate: f64,
    fan_cooling: f64,
}

impl HotendModel {
    pub fn new(config: &PlantConfig) -> Self {
        let model = Self {
            temperature: config.initial_temp,
            ambient: config.ambient_temp,
            heat_capacity: config.heat_capacity,
            cooling_rate: config.cooling_rate,
            fan_cooling: 0.0,
        };
        tracing::debug!(
            "Hotend model: C={}, k={}, ambient={:.1}°C, full-power equilibrium={:.1}°C",
            model.heat_capacity,
            model.cooling_rate,
            model.ambient,
            model.equilibrium_temp(100.0)
        );
        model
    }

    /// Temperature the block settles at when held at `heater_power`.
    /// Infinite when the block has no cooling at all.
    pub fn equilibrium_temp(&self, heater_power: f64) -> f64 {
        let k = self.cooling_rate + self.fan_cooling;
        self.ambient + (heater_power / self.heat_capacity) / k
    }

    pub fn ambient(&self) -> f64 {
        self.ambient
    }
}

impl ThermalPlant for HotendModel {
    fn update(&mut self, heater_power: f64, dt: f64) -> f64 {
        let heating = heater_power / self.heat_capacity;
        let cooling = (self.cooling_rate + self.fan_cooling) * (self.temperature - self.ambient);
        self.temperature += (heating - cooling) * dt;
        self.temperature
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn set_extra_cooling(&mut self, coefficient: f64) {
        self.fan_cooling = coefficient.max(0.0);
    }
}

/// Simulated thermistor with optional first-order lag and uniform noise.
#[derive(Debug, Clone)]
pub struct Thermistor {
    measured: f64,
    lag: f64,
    noise: f64,
    rng: StdRng,
}

impl Thermistor {
    pub fn new(initial_temp: f64, config: &SensorConfig) -> Self {
        Self {
            measured: initial_temp,
            lag: config.lag,
            noise: config.noise,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }
}

impl TemperatureSensor for Thermistor {
    fn read(&mut self, true_temp: f64, dt: f64) -> f64 {
        self.measured = if self.lag > 0.0 {
            let alpha = (self.lag * dt).min(1.0);
            self.measured + alpha * (true_temp - self.measured)
        } else {
            true_temp
        };
        if self.noise > 0.0 {
            self.measured + self.noise * (self.rng.random::<f64>() - 0.5)
        } else {
            self.measured
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunawayReason {
    /// Temperature went above the absolute limit.
    OverTemperature,
    /// Heater ran flat out without holding the setpoint.
    HeatingStalled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ThermalEvent {
    SetpointChanged { time: f64, setpoint: f64 },
    FanChanged { time: f64, cooling: f64 },
    RunawayDetected { time: f64, temperature: f64, reason: RunawayReason },
}

/// Thermal-runaway watchdog in the style of printer firmware.
///
/// Armed once the temperature first reaches the hysteresis band below the
/// setpoint. While armed, a full-power heater that stays below that band for
/// longer than `period` trips the guard. Exceeding `max_temp` trips it at any time.
#[derive(Debug, Clone)]
pub struct RunawayGuard {
    config: RunawayConfig,
    setpoint: Option<f64>,
    armed: bool,
    timer: f64,
    tripped: bool,
}

impl RunawayGuard {
    pub fn new(config: &RunawayConfig) -> Self {
        Self {
            config: config.clone(),
            setpoint: None,
            armed: false,
            timer: 0.0,
            tripped: false,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Feed one control tick. Returns the reason the first time the guard trips.
    pub fn check(
        &mut self,
        setpoint: f64,
        temperature: f64,
        heater_power: f64,
        max_power: f64,
        dt: f64,
    ) -> Option<RunawayReason> {
        if !self.config.enabled || self.tripped {
            return None;
        }
        if temperature > self.config.max_temp {
            self.tripped = true;
            return Some(RunawayReason::OverTemperature);
        }
        if self.setpoint != Some(setpoint) {
            self.setpoint = Some(setpoint);
            self.armed = false;
            self.timer = 0.0;
        }
        let floor = setpoint - self.config.hysteresis;
        if !self.armed {
            if temperature >= floor {
                self.armed = true;
            }
            return None;
        }
        if temperature < floor && heater_power >= max_power {
            self.timer += dt;
        } else {
            self.timer = 0.0;
        }
        if self.timer > self.config.period {
            self.tripped = true;
            return Some(RunawayReason::HeatingStalled);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heating_step_matches_first_order_model() {
        let mut model = HotendModel::new(&PlantConfig::default());
        let t = model.update(100.0, 0.1);
        // 25 + (100/5 - 0.03*0) * 0.1
        assert!((t - 27.0).abs() < 1e-12);
        let t = model.update(0.0, 0.1);
        assert!((t - (27.0 - 0.03 * 2.0 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_equilibrium_temperature() {
        let model = HotendModel::new(&PlantConfig::default());
        let eq = model.equilibrium_temp(100.0);
        assert!((eq - (25.0 + 20.0 / 0.03)).abs() < 1e-9);
        assert_eq!(model.equilibrium_temp(0.0), 25.0);
    }

    #[test]
    fn test_model_converges_to_equilibrium() {
        let mut model = HotendModel::new(&PlantConfig::default());
        let eq = model.equilibrium_temp(30.0);
        for _ in 0..20_000 {
            model.update(30.0, 0.1);
        }
        assert!((model.temperature() - eq).abs() < 0.01);
    }

    #[test]
    fn test_fan_cooling_lowers_equilibrium() {
        let mut model = HotendModel::new(&PlantConfig::default());
        let before = model.equilibrium_temp(50.0);
        model.set_extra_cooling(0.01);
        assert!(model.equilibrium_temp(50.0) < before);
        model.set_extra_cooling(-1.0);
        assert_eq!(model.equilibrium_temp(50.0), before);
    }

    #[test]
    fn test_ideal_thermistor_reads_true_temperature() {
        let mut sensor = Thermistor::new(25.0, &SensorConfig::default());
        assert_eq!(sensor.read(180.0, 0.1), 180.0);
    }

    #[test]
    fn test_thermistor_lag_and_noise() {
        let config = SensorConfig { noise: 0.0, lag: 1.0, seed: 1 };
        let mut sensor = Thermistor::new(0.0, &config);
        assert!((sensor.read(100.0, 0.1) - 10.0).abs() < 1e-12);

        let noisy = SensorConfig { noise: 2.0, lag: 0.0, seed: 7 };
        let mut a = Thermistor::new(0.0, &noisy);
        let mut b = Thermistor::new(0.0, &noisy);
        for _ in 0..100 {
            let ra = a.read(50.0, 0.1);
            assert!((ra - 50.0).abs() <= 1.0);
            // same seed, same sequence
            assert_eq!(ra, b.read(50.0, 0.1));
        }
    }

    #[test]
    fn test_guard_trips_on_over_temperature() {
        let mut guard = RunawayGuard::new(&RunawayConfig::default());
        assert_eq!(guard.check(200.0, 250.0, 0.0, 100.0, 0.1), None);
        assert_eq!(
            guard.check(200.0, 301.0, 0.0, 100.0, 0.1),
            Some(RunawayReason::OverTemperature)
        );
        assert!(guard.is_tripped());
        assert_eq!(guard.check(200.0, 320.0, 0.0, 100.0, 0.1), None);
    }

    #[test]
    fn test_guard_trips_when_heating_stalls_after_arming() {
        let config = RunawayConfig { period: 1.0, ..RunawayConfig::default() };
        let mut guard = RunawayGuard::new(&config);
        // Not armed yet: heating from cold at full power is fine.
        for _ in 0..100 {
            assert_eq!(guard.check(200.0, 50.0, 100.0, 100.0, 0.1), None);
        }
        guard.check(200.0, 195.0, 40.0, 100.0, 0.1);
        assert!(guard.is_armed());
        let mut tripped = None;
        for _ in 0..20 {
            if let Some(reason) = guard.check(200.0, 150.0, 100.0, 100.0, 0.1) {
                tripped = Some(reason);
                break;
            }
        }
        assert_eq!(tripped, Some(RunawayReason::HeatingStalled));
    }

    #[test]
    fn test_guard_disarms_on_setpoint_change() {
        let config = RunawayConfig { period: 1.0, ..RunawayConfig::default() };
        let mut guard = RunawayGuard::new(&config);
        guard.check(200.0, 200.0, 50.0, 100.0, 0.1);
        assert!(guard.is_armed());
        guard.check(250.0, 200.0, 100.0, 100.0, 0.1);
        assert!(!guard.is_armed());
        for _ in 0..50 {
            assert_eq!(guard.check(250.0, 210.0, 100.0, 100.0, 0.1), None);
        }
    }

    #[test]
    fn test_disabled_guard_never_trips() {
        let config = RunawayConfig { enabled: false, ..RunawayConfig::default() };
        let mut guard = RunawayGuard::new(&config);
        assert_eq!(guard.check(200.0, 1000.0, 100.0, 100.0, 0.1), None);
    }
}
