//! Built-in experiments.
//!
//! A scenario is a set of config overrides, applied before any command-line
//! `--param` values, plus a schedule of changes during the run.

use crate::config::{Config, ConfigError, apply_overrides};
use crate::error::{SimError, SimResult};
use crate::simulator::{SimulationTrace, Simulator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledChange {
    Setpoint { at: f64, setpoint: f64 },
    Fan { at: f64, cooling: f64 },
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub overrides: &'static [(&'static str, &'static str)],
    pub changes: &'static [ScheduledChange],
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "baseline",
        description: "Heat from 25°C to 200°C with the configured gains",
        overrides: &[],
        changes: &[],
    },
    Scenario {
        name: "p_only",
        description: "Proportional control only (Ki = Kd = 0), leaves a steady-state error",
        overrides: &[("controller.ki", "0"), ("controller.kd", "0")],
        changes: &[],
    },
    Scenario {
        name: "pi",
        description: "PI control (Kd = 0)",
        overrides: &[("controller.kd", "0")],
        changes: &[],
    },
    Scenario {
        name: "setpoint_step",
        description: "Target raised from 200°C to 230°C after 150s",
        overrides: &[],
        changes: &[ScheduledChange::Setpoint { at: 150.0, setpoint: 230.0 }],
    },
    Scenario {
        name: "fan_disturbance",
        description: "Part-cooling fan switched on after 150s",
        overrides: &[],
        changes: &[ScheduledChange::Fan { at: 150.0, cooling: 0.01 }],
    },
    Scenario {
        name: "aggressive",
        description: "High gains (Kp=20, Ki=1, Kd=0.5): fast rise, large overshoot",
        overrides: &[("controller.kp", "20"), ("controller.ki", "1"), ("controller.kd", "0.5")],
        changes: &[],
    },
];

pub fn builtin_scenarios() -> &'static [Scenario] {
    SCENARIOS
}

pub fn find_scenario(name: &str) -> SimResult<&'static Scenario> {
    SCENARIOS
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| SimError::UnknownScenario(name.to_string()))
}

impl Scenario {
    /// Build the run configuration: scenario overrides first, then the caller's.
    pub fn configure(
        &self,
        table: toml::Table,
        params: &[(String, String)],
    ) -> Result<Config, ConfigError> {
        let overrides: Vec<(String, String)> = self
            .overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain(params.iter().cloned())
            .collect();
        apply_overrides(table, &overrides)
    }

    /// Simulate this scenario with an already built configuration.
    pub fn run(&self, config: &Config) -> SimulationTrace {
        self.run_named(config, self.name)
    }

    /// Like [`Scenario::run`], labelling the trace with `name`.
    pub fn run_named(&self, config: &Config, name: &str) -> SimulationTrace {
        let mut sim = Simulator::from_config(config);
        for change in self.changes {
            match *change {
                ScheduledChange::Setpoint { at, setpoint } => sim.schedule_setpoint(at, setpoint),
                ScheduledChange::Fan { at, cooling } => sim.schedule_fan(at, cooling),
            }
        }
        sim.run(name)
    }
}
