// src/hardware/mod.rs - Simulated heater hardware and its controller
pub mod hardware_traits;
pub mod temperature;
pub mod thermal;

pub use hardware_traits::{TemperatureSensor, ThermalPlant};
pub use temperature::{PidController, PidGains, PidOutput};
pub use thermal::{HotendModel, RunawayGuard, RunawayReason, ThermalEvent, Thermistor};
