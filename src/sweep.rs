//! Parameter sweeps.
//!
//! Every combination of the swept values is one simulation run. Runs are
//! independent and are spread over a pool of worker threads fed through a
//! crossbeam channel; results are put back in run order.

use crate::analysis::{PerformanceReport, analyse};
use crate::error::{SimError, SimResult};
use crate::output::export_trace;
use crate::scenarios::Scenario;
use crossbeam_channel::unbounded;
use std::path::{Path, PathBuf};

const MAX_RUNS: usize = 10_000;

/// One swept key and the values it takes.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepAxis {
    pub key: String,
    pub values: Vec<f64>,
}

impl SweepAxis {
    /// Parse `start:step:end` (end inclusive) or a comma separated list of values.
    pub fn parse(key: &str, spec: &str) -> SimResult<Self> {
        let invalid = |why: &str| SimError::InvalidSweep(format!("{key}={spec}: {why}"));
        let values: Vec<f64> = if spec.contains(':') {
            let parts: Vec<f64> = spec
                .split(':')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| invalid("expected numbers"))?;
            let &[start, step, end] = &parts[..] else {
                return Err(invalid("expected start:step:end"));
            };
            if !(start.is_finite() && step.is_finite() && end.is_finite()) {
                return Err(invalid("values must be finite"));
            }
            if step <= 0.0 {
                return Err(invalid("step must be > 0"));
            }
            if end < start {
                return Err(invalid("end is below start"));
            }
            let count = ((end - start) / step + 1e-9).floor() + 1.0;
            if count > MAX_RUNS as f64 {
                return Err(invalid("too many values"));
            }
            (0..count as usize).map(|k| start + k as f64 * step).collect()
        } else {
            let list = spec
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid("expected numbers"))?;
            if list.iter().any(|v| !v.is_finite()) {
                return Err(invalid("values must be finite"));
            }
            list
        };
        if values.is_empty() {
            return Err(invalid("no values"));
        }
        Ok(Self {
            key: key.to_string(),
            values,
        })
    }
}

/// All combinations of the axis values, first axis varying slowest.
pub fn combinations(axes: &[SweepAxis]) -> SimResult<Vec<Vec<(String, f64)>>> {
    let total = axes
        .iter()
        .try_fold(1usize, |acc, axis| acc.checked_mul(axis.values.len()))
        .filter(|&n| n <= MAX_RUNS)
        .ok_or_else(|| SimError::InvalidSweep(format!("more than {MAX_RUNS} runs")))?;

    let mut runs = Vec::with_capacity(total);
    for index in 0..total {
        let mut rest = index;
        let mut combo = vec![(String::new(), 0.0); axes.len()];
        for (slot, axis) in axes.iter().enumerate().rev() {
            let n = axis.values.len();
            combo[slot] = (axis.key.clone(), axis.values[rest % n]);
            rest /= n;
        }
        runs.push(combo);
    }
    Ok(runs)
}

#[derive(Debug, Clone)]
pub struct SweepRow {
    pub index: usize,
    pub params: Vec<(String, f64)>,
    pub report: PerformanceReport,
}

/// Everything a sweep needs besides the axes.
pub struct SweepPlan<'a> {
    pub scenario: &'a Scenario,
    pub table: toml::Table,
    pub params: Vec<(String, String)>,
    pub jobs: usize,
    /// Write each run's trace here when set.
    pub trace_dir: Option<PathBuf>,
}

/// Whole numbers are passed as integers so they also fit integer config fields.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn run_one(plan: &SweepPlan<'_>, index: usize, combo: &[(String, f64)]) -> SimResult<SweepRow> {
    let params: Vec<(String, String)> = plan
        .params
        .iter()
        .cloned()
        .chain(combo.iter().map(|(k, v)| (k.clone(), format_value(*v))))
        .collect();
    let config = plan.scenario.configure(plan.table.clone(), &params)?;
    let name = format!("{}_{:04}", plan.scenario.name, index);
    let trace = plan.scenario.run_named(&config, &name);
    let report = analyse(&trace, &config.analysis)?;
    if let Some(dir) = &plan.trace_dir {
        export_trace(&trace, dir, config.simulation.jsonl)?;
    }
    Ok(SweepRow {
        index,
        params: combo.to_vec(),
        report,
    })
}

/// Run every combination on `plan.jobs` worker threads.
pub fn run_sweep(plan: &SweepPlan<'_>, axes: &[SweepAxis]) -> SimResult<Vec<SweepRow>> {
    let runs = combinations(axes)?;
    let workers = plan.jobs.clamp(1, runs.len().max(1));
    tracing::info!("Sweep: {} runs on {} workers", runs.len(), workers);

    let (job_tx, job_rx) = unbounded::<(usize, Vec<(String, f64)>)>();
    let (result_tx, result_rx) = unbounded::<SimResult<SweepRow>>();
    for (index, combo) in runs.into_iter().enumerate() {
        job_tx.send((index, combo)).ok();
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((index, combo)) = job_rx.recv() {
                    let result = run_one(plan, index, &combo);
                    if let Err(e) = &result {
                        tracing::error!("Sweep run {} failed: {}", index, e);
                    }
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut rows = result_rx.iter().collect::<SimResult<Vec<_>>>()?;
    rows.sort_by_key(|row| row.index);
    Ok(rows)
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write one CSV line per run: the swept values followed by the metrics.
pub fn write_summary(rows: &[SweepRow], path: &Path) -> SimResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header: Vec<String> = vec!["run".to_string()];
    if let Some(first) = rows.first() {
        header.extend(first.params.iter().map(|(k, _)| k.clone()));
    }
    header.extend(
        [
            "settling_time",
            "rise_time",
            "overshoot",
            "overshoot_percent",
            "mse",
            "steady_state_error",
            "runaway",
        ]
        .map(String::from),
    );
    wtr.write_record(&header)?;
    for row in rows {
        let r = &row.report;
        let mut record = vec![row.index.to_string()];
        record.extend(row.params.iter().map(|(_, v)| v.to_string()));
        record.extend([
            opt(r.settling_time),
            opt(r.rise_time),
            r.overshoot.to_string(),
            r.overshoot_percent.to_string(),
            r.mse.to_string(),
            r.steady_state_error.to_string(),
            r.runaway.to_string(),
        ]);
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
