// End-to-end checks of the closed loop against known step responses

use hotend_pid::analysis::analyse;
use hotend_pid::config::{AnalysisConfig, Config};
use hotend_pid::hardware::thermal::{RunawayReason, ThermalEvent};
use hotend_pid::scenarios::find_scenario;
use hotend_pid::simulator::run_simulation;

fn scenario_report(name: &str) -> hotend_pid::PerformanceReport {
    let scenario = find_scenario(name).unwrap();
    let config = scenario.configure(toml::Table::new(), &[]).unwrap();
    let trace = scenario.run(&config);
    analyse(&trace, &config.analysis).unwrap()
}

#[test]
fn test_baseline_step_response() {
    let report = scenario_report("baseline");
    let settling = report.settling_time.expect("baseline should settle");
    assert!((65.0..=66.0).contains(&settling), "settling time {settling}");
    assert!((report.overshoot - 10.69).abs() < 0.05, "overshoot {}", report.overshoot);
    assert!((report.overshoot_percent - 5.34).abs() < 0.05);
    assert!((report.mse - 335.49).abs() < 0.1, "mse {}", report.mse);
    let rise = report.rise_time.unwrap();
    assert!((7.5..=8.5).contains(&rise), "rise time {rise}");
    assert!(report.steady_state_error.abs() < 0.1);
    assert_eq!(report.peak_power, 100.0);
    assert!(!report.runaway);
}

#[test]
fn test_proportional_only_leaves_offset() {
    let report = scenario_report("p_only");
    // 5.1°C offset is outside the 4°C band, so the run never settles
    assert_eq!(report.settling_time, None);
    assert!((report.steady_state_error - 5.10).abs() < 0.05);
    assert!(report.overshoot < 0.0);
}

#[test]
fn test_aggressive_gains_overshoot_more() {
    let baseline = scenario_report("baseline");
    let aggressive = scenario_report("aggressive");
    assert!(aggressive.overshoot > 3.0 * baseline.overshoot);
    assert!(aggressive.settling_time.unwrap() < baseline.settling_time.unwrap());
}

#[test]
fn test_setpoint_step_tracks_new_target() {
    let scenario = find_scenario("setpoint_step").unwrap();
    let config = scenario.configure(toml::Table::new(), &[]).unwrap();
    let trace = scenario.run(&config);
    let last = trace.samples.last().unwrap();
    assert_eq!(last.setpoint, 230.0);
    assert!((last.temperature - 230.0).abs() < 0.5);
    assert!(matches!(
        trace.events[0],
        ThermalEvent::SetpointChanged { setpoint, .. } if setpoint == 230.0
    ));
}

#[test]
fn test_fan_disturbance_is_rejected() {
    let scenario = find_scenario("fan_disturbance").unwrap();
    let config = scenario.configure(toml::Table::new(), &[]).unwrap();
    let trace = scenario.run(&config);
    let after_fan: Vec<_> = trace.samples.iter().filter(|s| s.time >= 150.0).collect();
    // heater works harder once the fan is on, and the integral brings the temperature back
    let before_power = trace.samples[1490].heater_power;
    assert!(after_fan.last().unwrap().heater_power > before_power);
    assert!(after_fan.last().unwrap().error().abs() < 0.5);
}

#[test]
fn test_runaway_guard_shuts_heater_off() {
    let mut config = Config::default();
    config.runaway.max_temp = 205.0;
    let trace = run_simulation(&config);
    let trip = trace
        .events
        .iter()
        .find_map(|e| match e {
            ThermalEvent::RunawayDetected { time, reason, .. } => Some((*time, *reason)),
            _ => None,
        })
        .expect("guard should trip");
    assert_eq!(trip.1, RunawayReason::OverTemperature);
    assert!(trace.samples.iter().filter(|s| s.time > trip.0).all(|s| s.heater_power == 0.0));
    let report = analyse(&trace, &AnalysisConfig::default()).unwrap();
    assert!(report.runaway);
    assert!(trace.samples.last().unwrap().temperature < 150.0);
}

#[test]
fn test_noisy_sensor_is_deterministic_per_seed() {
    let mut config = Config::default();
    config.sensor.noise = 1.0;
    config.simulation.sim_time = 30.0;
    let a = run_simulation(&config);
    let b = run_simulation(&config);
    assert_eq!(a.samples, b.samples);
    assert!(a.samples.iter().any(|s| s.measured != s.temperature));
}

#[test]
fn test_anti_windup_reduces_overshoot() {
    let plain = run_simulation(&Config::default());
    let mut config = Config::default();
    config.controller.anti_windup = true;
    let limited = run_simulation(&config);
    let analysis = AnalysisConfig::default();
    let plain = analyse(&plain, &analysis).unwrap();
    let limited = analyse(&limited, &analysis).unwrap();
    assert!(limited.overshoot < plain.overshoot);
}
