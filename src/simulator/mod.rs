pub mod event_queue;

use crate::config::Config;
use crate::hardware::hardware_traits::{TemperatureSensor, ThermalPlant};
use crate::hardware::temperature::{PidController, PidGains};
use crate::hardware::thermal::{HotendModel, RunawayGuard, ThermalEvent, Thermistor};
use crate::simulator::event_queue::{SimClock, SimEventKind, SimEventQueue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One control tick as recorded in the trace.
///
/// `temperature` is the true block temperature at the start of the tick,
/// before the heater power chosen in that tick has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub setpoint: f64,
    pub temperature: f64,
    pub measured: f64,
    pub heater_power: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl Sample {
    pub fn error(&self) -> f64 {
        self.setpoint - self.temperature
    }
}

/// Complete record of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub name: String,
    pub gains: PidGains,
    pub dt: f64,
    pub samples: Vec<Sample>,
    pub events: Vec<ThermalEvent>,
}

impl SimulationTrace {
    pub fn runaway_detected(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, ThermalEvent::RunawayDetected { .. }))
    }
}

/// Fixed-step closed-loop simulation of a heater, its sensor and a PID controller.
pub struct Simulator<P: ThermalPlant, S: TemperatureSensor> {
    queue: SimEventQueue,
    clock: SimClock,
    plant: P,
    sensor: S,
    pid: PidController,
    guard: RunawayGuard,
    dt: f64,
    ticks: usize,
    sim_time: f64,
    power_limits: (f64, f64),
    samples: Vec<Sample>,
    events: Vec<ThermalEvent>,
}

impl Simulator<HotendModel, Thermistor> {
    /// Simulator for the hotend model and thermistor described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let plant = HotendModel::new(&config.plant);
        let sensor = Thermistor::new(config.plant.initial_temp, &config.sensor);
        Self::new(config, plant, sensor)
    }
}

impl<P: ThermalPlant, S: TemperatureSensor> Simulator<P, S> {
    pub fn new(config: &Config, plant: P, sensor: S) -> Self {
        let pid = PidController::from_config(&config.controller, config.simulation.target_temp);
        let ticks = config.tick_count();
        let clock = SimClock::new();
        tracing::info!(
            "Simulator initialized at time: {:?}, {} ticks of {}s, {}",
            clock.current_time,
            ticks,
            config.simulation.dt,
            pid.gains()
        );
        Self {
            queue: SimEventQueue::new(),
            clock,
            plant,
            sensor,
            pid,
            guard: RunawayGuard::new(&config.runaway),
            dt: config.simulation.dt,
            ticks,
            sim_time: config.simulation.sim_time,
            power_limits: (config.controller.output_min, config.controller.output_max),
            samples: Vec::with_capacity(ticks),
            events: Vec::new(),
        }
    }

    /// Change the target temperature `at` seconds into the run.
    pub fn schedule_setpoint(&mut self, at: f64, setpoint: f64) {
        self.schedule_change(at, SimEventKind::SetpointChange(setpoint));
    }

    /// Switch the part-cooling fan to `cooling` (extra cooling coefficient) at `at` seconds.
    pub fn schedule_fan(&mut self, at: f64, cooling: f64) {
        self.schedule_change(at, SimEventKind::FanChange(cooling));
    }

    fn schedule_change(&mut self, at: f64, kind: SimEventKind) {
        if !(at >= 0.0 && at < self.sim_time) {
            tracing::warn!("Ignoring {:?} at {}s: outside the simulated interval", kind, at);
            return;
        }
        self.queue.schedule(Duration::from_secs_f64(at), kind);
    }

    fn tick_time(&self, index: usize) -> f64 {
        index as f64 * self.dt
    }

    /// Run every scheduled tick and return the recorded trace.
    pub fn run(mut self, name: &str) -> SimulationTrace {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let mut next_tick = 0usize;
        if self.ticks > 0 {
            self.queue.schedule(Duration::ZERO, SimEventKind::ControlTick);
        }

        while let Some(event) = self.queue.pop() {
            self.clock.advance_to(event.timestamp);
            match event.kind {
                SimEventKind::SetpointChange(setpoint) => {
                    tracing::info!("t={:.1}s setpoint -> {:.1}°C", self.clock.seconds(), setpoint);
                    self.pid.set_setpoint(setpoint);
                    self.events.push(ThermalEvent::SetpointChanged {
                        time: self.clock.seconds(),
                        setpoint,
                    });
                }
                SimEventKind::FanChange(cooling) => {
                    tracing::info!("t={:.1}s fan cooling -> {}", self.clock.seconds(), cooling);
                    self.plant.set_extra_cooling(cooling);
                    self.events.push(ThermalEvent::FanChanged {
                        time: self.clock.seconds(),
                        cooling,
                    });
                }
                SimEventKind::ControlTick => {
                    self.control_tick(next_tick);
                    next_tick += 1;
                    if next_tick < self.ticks {
                        let next_time = Duration::from_secs_f64(self.tick_time(next_tick));
                        self.queue.schedule(next_time, SimEventKind::ControlTick);
                    }
                }
            }
        }

        tracing::info!(
            "Simulation '{}' finished: {} samples, final temperature {:.2}°C",
            name,
            self.samples.len(),
            self.plant.temperature()
        );

        SimulationTrace {
            run_id,
            started_at,
            name: name.to_string(),
            gains: self.pid.gains(),
            dt: self.dt,
            samples: self.samples,
            events: self.events,
        }
    }

    fn control_tick(&mut self, index: usize) {
        let time = self.tick_time(index);
        let dt = self.dt;
        let (min_power, max_power) = self.power_limits;

        let temperature = self.plant.temperature();
        let measured = self.sensor.read(temperature, dt);
        let setpoint = self.pid.setpoint();
        let out = self.pid.update(measured, dt);

        let mut heater_power = out.output.clamp(min_power, max_power);
        if self.guard.is_tripped() {
            heater_power = min_power;
        } else if let Some(reason) =
            self.guard.check(setpoint, measured, heater_power, max_power, dt)
        {
            tracing::warn!(
                "Thermal runaway ({:?}) at t={:.1}s, T={:.1}°C: heater shut off",
                reason,
                time,
                measured
            );
            heater_power = min_power;
            self.events.push(ThermalEvent::RunawayDetected {
                time,
                temperature: measured,
                reason,
            });
        }

        tracing::trace!(
            "[Heater] t={:.2}s, power={:.2}, T={:.2}C, target={:.2}C, measured={:.2}C",
            time,
            heater_power,
            temperature,
            setpoint,
            measured
        );

        self.samples.push(Sample {
            time,
            setpoint,
            temperature,
            measured,
            heater_power,
            p: out.p,
            i: out.i,
            d: out.d,
        });

        self.plant.update(heater_power, dt);
    }
}

/// Run the hotend simulation described by `config` with no scheduled changes.
pub fn run_simulation(config: &Config) -> SimulationTrace {
    Simulator::from_config(config).run("simulation")
}
