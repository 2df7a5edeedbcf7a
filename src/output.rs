// src/output.rs - Trace export and text reports
use crate::analysis::PerformanceReport;
use crate::error::SimResult;
use crate::simulator::SimulationTrace;
use crate::tuning::TuneResult;
use csv::Writer;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write one CSV row per sample, with a header.
pub fn write_trace_csv(trace: &SimulationTrace, path: &Path) -> SimResult<()> {
    let mut wtr = Writer::from_path(path)?;
    for sample in &trace.samples {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    tracing::debug!("Wrote {} samples to {}", trace.samples.len(), path.display());
    Ok(())
}

/// Write run metadata on the first line, then one JSON object per sample.
pub fn write_trace_jsonl(trace: &SimulationTrace, path: &Path) -> SimResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let header = serde_json::json!({
        "run_id": trace.run_id,
        "started_at": trace.started_at,
        "name": trace.name,
        "gains": trace.gains,
        "dt": trace.dt,
        "events": trace.events,
    });
    writeln!(out, "{}", header)?;
    for sample in &trace.samples {
        writeln!(out, "{}", serde_json::to_string(sample)?)?;
    }
    out.flush()?;
    Ok(())
}

/// Write the trace files for a run into `dir`, returning the paths written.
pub fn export_trace(trace: &SimulationTrace, dir: &Path, jsonl: bool) -> SimResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    let csv_path = dir.join(format!("{}.csv", trace.name));
    write_trace_csv(trace, &csv_path)?;
    written.push(csv_path);
    if jsonl {
        let jsonl_path = dir.join(format!("{}.jsonl", trace.name));
        write_trace_jsonl(trace, &jsonl_path)?;
        written.push(jsonl_path);
    }
    Ok(written)
}

/// Human-readable summary of a run, see [`format_report`].
pub struct ReportDisplay<'a> {
    pub trace: &'a SimulationTrace,
    pub report: &'a PerformanceReport,
}

impl fmt::Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (trace, report) = (self.trace, self.report);
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "Performance: {} ({})", trace.name, trace.gains)?;
        writeln!(f, "{rule}")?;
        match report.settling_time {
            Some(t) => writeln!(f, "Settling time:      {:.1} s", t)?,
            None => writeln!(f, "Settling time:      not reached (did not converge)")?,
        }
        match report.rise_time {
            Some(t) => writeln!(f, "Rise time (10-90%): {:.1} s", t)?,
            None => writeln!(f, "Rise time (10-90%): n/a")?,
        }
        writeln!(
            f,
            "Max overshoot:      {:.1}°C ({:.1}%)",
            report.overshoot, report.overshoot_percent
        )?;
        writeln!(f, "Mean squared error: {:.2}", report.mse)?;
        writeln!(f, "Final error:        {:.2}°C", report.steady_state_error)?;
        writeln!(f, "Peak heater power:  {:.1}%", report.peak_power)?;
        if report.runaway {
            writeln!(f, "THERMAL RUNAWAY DETECTED: heater was shut off")?;
        }
        writeln!(f, "{rule}")
    }
}

pub fn format_report(trace: &SimulationTrace, report: &PerformanceReport) -> String {
    ReportDisplay { trace, report }.to_string()
}

pub fn format_tune_result(result: &TuneResult) -> String {
    format!(
        "Ku = {:.3}, Tu = {:.2} s, amplitude = {:.2}°C over {} cycles\n\
         Suggested gains ({:?}): Kp={:.3}, Ki={:.4}, Kd={:.3}\n",
        result.ultimate_gain,
        result.ultimate_period,
        result.amplitude,
        result.cycles,
        result.rule,
        result.gains.kp,
        result.gains.ki,
        result.gains.kd
    )
}
