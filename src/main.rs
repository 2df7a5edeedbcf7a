// src/main.rs - Command line front end for the hotend PID simulator
use clap::{ArgAction, Parser, Subcommand};
use hotend_pid::config::{self, parse_key_val};
use hotend_pid::scenarios::{builtin_scenarios, find_scenario};
use hotend_pid::sweep::{SweepAxis, SweepPlan, run_sweep, write_summary};
use hotend_pid::{SimError, SimResult, analyse, output, tuning};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// PID control simulator for a 3D printer hotend
#[derive(Parser, Debug)]
#[command(
    name = "hotend-pid",
    version,
    about = "Simulate, analyse, sweep and auto-tune PID control of a hotend heater."
)]
struct Cli {
    /// Path to a TOML config file (defaults are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for traces, overrides simulation.output_dir
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Parameter override (e.g. --param controller.kp=8.0)
    #[arg(long, global = true, value_parser = parse_key_val)]
    param: Vec<(String, String)>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available built-in scenarios
    ListScenarios,
    /// Run a single scenario (default)
    Run {
        #[arg(long, default_value = "baseline")]
        scenario: String,
        /// Also write the trace as JSON lines
        #[arg(long)]
        jsonl: bool,
        /// Only print the report, write no files
        #[arg(long)]
        no_export: bool,
    },
    /// Run a parameter sweep (e.g. --sweep controller.kp=2:1:10)
    Sweep {
        #[arg(long, default_value = "baseline")]
        scenario: String,
        #[arg(long, value_parser = parse_key_val, required = true)]
        sweep: Vec<(String, String)>,
        /// Worker threads, defaults to the available parallelism
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Write the trace of every run, not just the summary
        #[arg(long)]
        traces: bool,
    },
    /// Relay auto-tune at simulation.target_temp
    Tune {
        /// Simulate the baseline scenario with the tuned gains afterwards
        #[arg(long)]
        apply: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_table(cli: &Cli) -> SimResult<toml::Table> {
    match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            Ok(config::load_table(&path.to_string_lossy())?)
        }
        None => Ok(toml::Table::new()),
    }
}

fn output_dir(cli: &Cli, config: &config::Config) -> PathBuf {
    cli.output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.simulation.output_dir))
}

fn run(cli: &Cli) -> SimResult<()> {
    let table = load_table(cli)?;
    let default_run = Commands::Run {
        scenario: "baseline".to_string(),
        jsonl: false,
        no_export: false,
    };

    match cli.command.as_ref().unwrap_or(&default_run) {
        Commands::ListScenarios => {
            println!("Available scenarios:");
            for scenario in builtin_scenarios() {
                println!("  {:<16} {}", scenario.name, scenario.description);
            }
        }
        Commands::Run { scenario, jsonl, no_export } => {
            let scenario = find_scenario(scenario)?;
            let mut config = scenario.configure(table, &cli.param)?;
            config.simulation.jsonl |= *jsonl;
            tracing::info!(
                "Running scenario '{}': target {:.1}°C for {}s",
                scenario.name,
                config.simulation.target_temp,
                config.simulation.sim_time
            );
            let trace = scenario.run(&config);
            let report = analyse(&trace, &config.analysis)?;
            if !*no_export {
                let dir = output_dir(cli, &config);
                for path in output::export_trace(&trace, &dir, config.simulation.jsonl)? {
                    tracing::info!("Trace written to {}", path.display());
                }
            }
            print!("{}", output::format_report(&trace, &report));
        }
        Commands::Sweep { scenario, sweep, jobs, traces } => {
            let scenario = find_scenario(scenario)?;
            let axes = sweep
                .iter()
                .map(|(key, spec)| SweepAxis::parse(key, spec))
                .collect::<SimResult<Vec<_>>>()?;
            // validate the base configuration once before fanning out
            let base = scenario.configure(table.clone(), &cli.param)?;
            let dir = output_dir(cli, &base);
            std::fs::create_dir_all(&dir)?;
            let jobs = (*jobs).unwrap_or_else(|| {
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            });
            let plan = SweepPlan {
                scenario,
                table,
                params: cli.param.clone(),
                jobs,
                trace_dir: (*traces).then(|| dir.clone()),
            };
            let rows = run_sweep(&plan, &axes)?;
            let summary = dir.join("sweep_summary.csv");
            write_summary(&rows, &summary)?;
            println!("{} runs, summary written to {}", rows.len(), summary.display());
            if let Some(best) = rows
                .iter()
                .filter(|r| r.report.settling_time.is_some())
                .min_by(|a, b| a.report.mse.total_cmp(&b.report.mse))
            {
                println!(
                    "Lowest MSE among settled runs: run {} {:?} (MSE {:.2})",
                    best.index, best.params, best.report.mse
                );
            }
        }
        Commands::Tune { apply } => {
            let scenario = find_scenario("baseline")?;
            let mut config = scenario.configure(table, &cli.param)?;
            let result = tuning::auto_tune_config(&config)?;
            print!("{}", output::format_tune_result(&result));
            if *apply {
                config.controller.kp = result.gains.kp;
                config.controller.ki = result.gains.ki;
                config.controller.kd = result.gains.kd;
                let trace = scenario.run_named(&config, "tuned");
                let report = analyse(&trace, &config.analysis)?;
                print!("{}", output::format_report(&trace, &report));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            if let SimError::Config(_) = e {
                tracing::error!(
                    "Please ensure the configuration file exists and is properly formatted"
                );
            }
            ExitCode::FAILURE
        }
    }
}
