//! PID temperature control simulator for a 3D printer hotend.
//!
//! A first-order thermal model of the hotend is driven by a PID controller
//! through a heater clamped to 0-100%. Runs produce a [`SimulationTrace`]
//! that can be analysed for settling time, overshoot and error, exported as
//! CSV or JSON lines, swept over parameter ranges, or used to auto-tune gains.

pub mod analysis;
pub mod config;
pub mod error;
pub mod hardware;
pub mod output;
pub mod scenarios;
pub mod simulator;
pub mod sweep;
pub mod tuning;

pub use analysis::{PerformanceReport, analyse};
pub use config::{Config, ConfigError, load_config};
pub use error::{SimError, SimResult};
pub use simulator::{Sample, SimulationTrace, Simulator, run_simulation};
