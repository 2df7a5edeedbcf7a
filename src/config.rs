//! # Simulation Configuration
//!
//! Every section is optional; missing keys fall back to the defaults below,
//! which describe a small hotend heated from room temperature to 200°C.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [controller]
//! kp = 5.0
//! ki = 0.1
//! kd = 1.0
//!
//! [plant]
//! heat_capacity = 5.0
//! cooling_rate = 0.03
//!
//! [simulation]
//! target_temp = 200.0
//! sim_time = 300.0
//! dt = 0.1
//! ```
//!
//! Values can also be overridden from the command line with dotted keys,
//! e.g. `controller.kp=8.0`, see [`apply_overrides`].

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid override '{0}'")]
    Override(String),
}

/// Top-level configuration for a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub runaway: RunawayConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

/// PID gains and heater output handling.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_ki")]
    pub ki: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    /// Heater power is always clamped to this range (percent).
    #[serde(default = "default_output_min")]
    pub output_min: f64,
    #[serde(default = "default_output_max")]
    pub output_max: f64,
    /// Stop integrating while the controller output is saturated.
    #[serde(default)]
    pub anti_windup: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            output_min: default_output_min(),
            output_max: default_output_max(),
            anti_windup: false,
        }
    }
}

/// First-order thermal model of the hotend.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlantConfig {
    #[serde(default = "default_room_temp")]
    pub initial_temp: f64,
    #[serde(default = "default_room_temp")]
    pub ambient_temp: f64,
    #[serde(default = "default_heat_capacity")]
    pub heat_capacity: f64,
    #[serde(default = "default_cooling_rate")]
    pub cooling_rate: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            initial_temp: default_room_temp(),
            ambient_temp: default_room_temp(),
            heat_capacity: default_heat_capacity(),
            cooling_rate: default_cooling_rate(),
        }
    }
}

/// Thermistor measurement path. Zero noise and zero lag read the true temperature.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    #[serde(default)]
    pub noise: f64,
    #[serde(default)]
    pub lag: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise: 0.0,
            lag: 0.0,
            seed: default_seed(),
        }
    }
}

/// Thermal-runaway protection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunawayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_temp")]
    pub max_temp: f64,
    #[serde(default = "default_runaway_hysteresis")]
    pub hysteresis: f64,
    /// Seconds the heater may run flat out while stuck below the setpoint.
    #[serde(default = "default_runaway_period")]
    pub period: f64,
}

impl Default for RunawayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_temp: default_max_temp(),
            hysteresis: default_runaway_hysteresis(),
            period: default_runaway_period(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_target_temp")]
    pub target_temp: f64,
    #[serde(default = "default_sim_time")]
    pub sim_time: f64,
    #[serde(default = "default_dt")]
    pub dt: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Also write one JSON object per sample next to the CSV trace.
    #[serde(default)]
    pub jsonl: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            target_temp: default_target_temp(),
            sim_time: default_sim_time(),
            dt: default_dt(),
            output_dir: default_output_dir(),
            jsonl: false,
        }
    }
}

/// Settling detection parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Band around the setpoint, as a fraction of the setpoint.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Number of consecutive samples that must stay inside the band.
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            window: default_window(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningRule {
    ZieglerNichols,
    PiOnly,
    POnly,
    NoOvershoot,
}

/// Relay auto-tune experiment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default = "default_output_max")]
    pub relay_power: f64,
    #[serde(default = "default_relay_hysteresis")]
    pub hysteresis: f64,
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    #[serde(default = "default_tune_max_time")]
    pub max_time: f64,
    #[serde(default = "default_rule")]
    pub rule: TuningRule,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            relay_power: default_output_max(),
            hysteresis: default_relay_hysteresis(),
            cycles: default_cycles(),
            max_time: default_tune_max_time(),
            rule: default_rule(),
        }
    }
}

/// Upper bound on control ticks in one run.
pub const MAX_TICKS: usize = 10_000_000;

impl Config {
    fn numeric_fields(&self) -> [(&'static str, f64); 21] {
        let (c, p, s, r, sim, tune) = (
            &self.controller,
            &self.plant,
            &self.sensor,
            &self.runaway,
            &self.simulation,
            &self.tuning,
        );
        [
            ("controller.kp", c.kp),
            ("controller.ki", c.ki),
            ("controller.kd", c.kd),
            ("controller.output_min", c.output_min),
            ("controller.output_max", c.output_max),
            ("plant.initial_temp", p.initial_temp),
            ("plant.ambient_temp", p.ambient_temp),
            ("plant.heat_capacity", p.heat_capacity),
            ("plant.cooling_rate", p.cooling_rate),
            ("sensor.noise", s.noise),
            ("sensor.lag", s.lag),
            ("runaway.max_temp", r.max_temp),
            ("runaway.hysteresis", r.hysteresis),
            ("runaway.period", r.period),
            ("simulation.target_temp", sim.target_temp),
            ("simulation.sim_time", sim.sim_time),
            ("simulation.dt", sim.dt),
            ("analysis.tolerance", self.analysis.tolerance),
            ("tuning.relay_power", tune.relay_power),
            ("tuning.hysteresis", tune.hysteresis),
            ("tuning.max_time", tune.max_time),
        ]
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_finite = self
            .numeric_fields()
            .into_iter()
            .find(|(_, v)| !v.is_finite());
        if let Some((key, value)) = non_finite {
            return Err(ConfigError::Invalid(format!("{key} must be finite, got {value}")));
        }

        let sim = &self.simulation;
        if sim.dt <= 0.0 {
            return Err(ConfigError::Invalid("simulation.dt must be > 0".to_string()));
        }
        if sim.sim_time <= 0.0 {
            return Err(ConfigError::Invalid("simulation.sim_time must be > 0".to_string()));
        }
        let ticks = (sim.sim_time / sim.dt).round();
        if ticks < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "simulation.sim_time ({}) is shorter than one simulation.dt step ({})",
                sim.sim_time, sim.dt
            )));
        }
        if ticks > MAX_TICKS as f64 {
            return Err(ConfigError::Invalid(format!(
                "simulation.sim_time / simulation.dt exceeds {MAX_TICKS} ticks"
            )));
        }
        if (self.tuning.max_time / sim.dt).ceil() > MAX_TICKS as f64 {
            return Err(ConfigError::Invalid(format!(
                "tuning.max_time / simulation.dt exceeds {MAX_TICKS} ticks"
            )));
        }
        if self.plant.heat_capacity <= 0.0 {
            return Err(ConfigError::Invalid("plant.heat_capacity must be > 0".to_string()));
        }
        if self.plant.cooling_rate < 0.0 {
            return Err(ConfigError::Invalid("plant.cooling_rate must be >= 0".to_string()));
        }
        if self.controller.output_min >= self.controller.output_max {
            return Err(ConfigError::Invalid(format!(
                "controller.output_min ({}) must be below output_max ({})",
                self.controller.output_min, self.controller.output_max
            )));
        }
        if self.sensor.noise < 0.0 || self.sensor.lag < 0.0 {
            return Err(ConfigError::Invalid(
                "sensor.noise and sensor.lag must be >= 0".to_string(),
            ));
        }
        if !(self.analysis.tolerance > 0.0 && self.analysis.tolerance < 1.0) {
            return Err(ConfigError::Invalid(
                "analysis.tolerance must be between 0 and 1".to_string(),
            ));
        }
        if self.analysis.window == 0 {
            return Err(ConfigError::Invalid("analysis.window must be >= 1".to_string()));
        }
        if self.runaway.period <= 0.0 || self.runaway.hysteresis < 0.0 {
            return Err(ConfigError::Invalid(
                "runaway.period must be > 0 and hysteresis >= 0".to_string(),
            ));
        }
        let tune = &self.tuning;
        if tune.relay_power <= 0.0
            || tune.cycles < 2
            || tune.max_time <= 0.0
            || tune.hysteresis < 0.0
        {
            return Err(ConfigError::Invalid(
                "tuning needs relay_power > 0, cycles >= 2, max_time > 0 and hysteresis >= 0"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Number of control ticks in a run.
    pub fn tick_count(&self) -> usize {
        (self.simulation.sim_time / self.simulation.dt).round() as usize
    }
}

// Default value functions
fn default_kp() -> f64 { 5.0 }
fn default_ki() -> f64 { 0.1 }
fn default_kd() -> f64 { 1.0 }
fn default_output_min() -> f64 { 0.0 }
fn default_output_max() -> f64 { 100.0 }
fn default_room_temp() -> f64 { 25.0 }
fn default_heat_capacity() -> f64 { 5.0 }
fn default_cooling_rate() -> f64 { 0.03 }
fn default_seed() -> u64 { 42 }
fn default_true() -> bool { true }
fn default_max_temp() -> f64 { 300.0 }
fn default_runaway_hysteresis() -> f64 { 10.0 }
fn default_runaway_period() -> f64 { 40.0 }
fn default_target_temp() -> f64 { 200.0 }
fn default_sim_time() -> f64 { 300.0 }
fn default_dt() -> f64 { 0.1 }
fn default_output_dir() -> String { "./sim_output".to_string() }
fn default_tolerance() -> f64 { 0.02 }
fn default_window() -> usize { 50 }
fn default_relay_hysteresis() -> f64 { 2.0 }
fn default_cycles() -> usize { 5 }
fn default_tune_max_time() -> f64 { 1800.0 }
fn default_rule() -> TuningRule { TuningRule::ZieglerNichols }

/// Parse a `KEY=VAL` pair as used by `--param` and `--sweep`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].trim().to_string(), s[pos + 1..].trim().to_string())),
        None => Err(format!("Invalid KEY=VAL: no `=` found in '{}'.", s)),
    }
}

/// Interpret a command-line value as a TOML scalar.
fn parse_scalar(raw: &str) -> toml::Value {
    if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else {
        toml::Value::String(raw.to_string())
    }
}

/// Set `section.key = value` inside a raw TOML table.
fn set_dotted(table: &mut toml::Table, key: &str, raw: &str) -> Result<(), ConfigError> {
    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| ConfigError::Override(format!("{key}: expected section.key")))?;
    if field.is_empty() || field.contains('.') {
        return Err(ConfigError::Override(format!("{key}: expected section.key")));
    }
    let entry = table
        .entry(section.to_string())
        .or_insert(toml::Value::Table(toml::Table::new()));
    match entry {
        toml::Value::Table(inner) => {
            inner.insert(field.to_string(), parse_scalar(raw));
            Ok(())
        }
        _ => Err(ConfigError::Override(format!("{key}: '{section}' is not a table"))),
    }
}

/// Build a config from a raw table plus `section.key=value` overrides, then validate it.
pub fn apply_overrides(
    mut table: toml::Table,
    overrides: &[(String, String)],
) -> Result<Config, ConfigError> {
    for (key, val) in overrides {
        tracing::debug!("Override param: {}={}", key, val);
        set_dotted(&mut table, key, val)?;
    }
    let config: Config = toml::Value::Table(table).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Read the raw TOML table behind a config file.
pub fn load_table(path: &str) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    apply_overrides(load_table(path)?, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.controller.kp, 5.0);
        assert_eq!(config.controller.ki, 0.1);
        assert_eq!(config.controller.kd, 1.0);
        assert_eq!(config.plant.initial_temp, 25.0);
        assert_eq!(config.plant.heat_capacity, 5.0);
        assert_eq!(config.plant.cooling_rate, 0.03);
        assert_eq!(config.simulation.target_temp, 200.0);
        assert_eq!(config.simulation.sim_time, 300.0);
        assert_eq!(config.simulation.dt, 0.1);
        assert_eq!(config.analysis.window, 50);
        assert_eq!(config.tick_count(), 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[controller]\nkp = 8.0\n\n[simulation]\nsim_time = 120.0").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.controller.kp, 8.0);
        assert_eq!(config.simulation.sim_time, 120.0);
        // Defaults for missing fields
        assert_eq!(config.controller.ki, 0.1);
        assert_eq!(config.plant.ambient_temp, 25.0);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_overrides_accept_integers_for_floats() {
        let overrides = vec![
            ("controller.kp".to_string(), "12".to_string()),
            ("controller.anti_windup".to_string(), "true".to_string()),
            ("analysis.window".to_string(), "20".to_string()),
        ];
        let config = apply_overrides(toml::Table::new(), &overrides).unwrap();
        assert_eq!(config.controller.kp, 12.0);
        assert!(config.controller.anti_windup);
        assert_eq!(config.analysis.window, 20);
    }

    #[test]
    fn test_override_rejects_bad_keys() {
        let missing_section = vec![("kp".to_string(), "1.0".to_string())];
        assert!(matches!(
            apply_overrides(toml::Table::new(), &missing_section),
            Err(ConfigError::Override(_))
        ));
        let unknown_field = vec![("controller.gain".to_string(), "1.0".to_string())];
        assert!(matches!(
            apply_overrides(toml::Table::new(), &unknown_field),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut config = Config::default();
        config.simulation.dt = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.controller.output_min = 100.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.tolerance = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_overrides_are_rejected() {
        for (key, value) in [
            ("controller.output_max", "nan"),
            ("controller.kp", "inf"),
            ("simulation.sim_time", "inf"),
            ("simulation.target_temp", "-inf"),
            ("plant.cooling_rate", "nan"),
            ("tuning.hysteresis", "nan"),
        ] {
            let overrides = vec![(key.to_string(), value.to_string())];
            let err = apply_overrides(toml::Table::new(), &overrides).unwrap_err();
            match err {
                ConfigError::Invalid(msg) => assert!(msg.contains(key), "{msg}"),
                other => panic!("{key}={value}: unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_tick_count_bounds() {
        let mut config = Config::default();
        config.simulation.sim_time = 0.04;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("simulation.sim_time"));

        config.simulation.sim_time = 0.06;
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_count(), 1);

        config.simulation.sim_time = 1e12;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.tuning.max_time = 1e12;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_tuning_rule_parsing() {
        let config: Config =
            toml::from_str("[tuning]\nrule = \"no_overshoot\"\ncycles = 3").unwrap();
        assert_eq!(config.tuning.rule, TuningRule::NoOvershoot);
        assert_eq!(config.tuning.cycles, 3);
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("controller.kp=4.5").unwrap(),
            ("controller.kp".to_string(), "4.5".to_string())
        );
        assert!(parse_key_val("controller.kp").is_err());
    }
}
