use clap::Parser;
use dnnsim::simulator::config::{load_and_merge_configs, CliOverrides};
use dnnsim::simulator::utils::log::{init_log_with, set_quiet};
use dnnsim::Simulator;
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

/// dnnsim - cycle-level simulator for DNN inference accelerators
#[derive(Parser, Debug)]
#[command(name = "dnnsim")]
#[command(version = "0.1.0")]
#[command(about = "Cycle, work and scheduling simulator for DNN accelerators", long_about = None)]
struct Args {
  /// Batch configuration file (TOML)
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Network file (JSON), replaces the configured networks
  #[arg(short, long, value_name = "FILE")]
  network: Option<String>,

  /// Architecture: DaDianNao, Stripes, DynamicStripes, BitPragmatic, Laconic, BitTacticalE or BitTacticalP
  #[arg(short, long, value_name = "ARCH")]
  arch: Option<String>,

  /// Task: Cycles, Potentials or Schedule
  #[arg(short, long, value_name = "TASK")]
  task: Option<String>,

  /// Worker threads over batch samples
  #[arg(long, value_name = "N")]
  threads: Option<usize>,

  /// Simulate only the first sample
  #[arg(long)]
  fast: bool,

  /// Quiet mode (only warnings and errors)
  #[arg(short, long)]
  quiet: bool,

  /// Directory for the result files
  #[arg(short, long, value_name = "DIR")]
  output_dir: Option<String>,

  /// Also write statistics as JSON
  #[arg(long)]
  json: bool,
}

fn main() -> ExitCode {
  let args = Args::parse();
  init_log_with(args.quiet);

  let overrides = CliOverrides {
    network: args.network,
    arch: args.arch,
    task: args.task,
    threads: args.threads,
    fast: args.fast,
    quiet: args.quiet,
    output_dir: args.output_dir,
    json: args.json,
  };

  let config = match load_and_merge_configs(args.config.as_deref(), &overrides) {
    Ok(config) => config,
    Err(e) => {
      error!("{}", e);
      return ExitCode::FAILURE;
    },
  };
  set_quiet(config.simulation.quiet);

  match Simulator::new(config).run() {
    Ok(_) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::FAILURE
    },
  }
}
