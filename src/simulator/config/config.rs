use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::arch::{ArchKind, ArchParams};
use crate::base::{NetworkOverrides, Quantization};
use crate::error::{Result, SimError};
use crate::memory::{GlobalBufferConfig, LocalBufferConfig};
use crate::scheduler::{SchedulerConfig, SearchShape};
use crate::simulator::ppu::PpuConfig;
use crate::simulator::sim::mode::{SimConfig, Task};

/// Network name used for errors that are not tied to one network
const ANY_NETWORK: &str = "*";

/// Run-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulationSection {
  #[serde(default = "default_threads")]
  pub threads: usize,
  #[serde(default)]
  pub fast_mode: bool,
  #[serde(default)]
  pub quiet: bool,
  #[serde(default = "default_output_dir")]
  pub output_dir: String,
  /// Write JSON statistics next to the CSV files
  #[serde(default)]
  pub json: bool,
}

fn default_threads() -> usize {
  1
}

fn default_output_dir() -> String {
  "results".to_string()
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      threads: default_threads(),
      fast_mode: false,
      quiet: false,
      output_dir: default_output_dir(),
      json: false,
    }
  }
}

impl SimulationSection {
  pub fn sim_config(&self) -> SimConfig {
    SimConfig {
      threads: self.threads,
      fast_mode: self.fast_mode,
      quiet: self.quiet,
    }
  }
}

/// One `[[networks]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkSection {
  /// Overrides the name stored in the network file
  #[serde(default)]
  pub name: Option<String>,
  pub path: String,
  #[serde(default)]
  pub network_bits: Option<u8>,
  #[serde(default)]
  pub quantization: Option<Quantization>,
  #[serde(default)]
  pub forward: Option<bool>,
  #[serde(default)]
  pub backward: Option<bool>,
}

impl NetworkSection {
  pub fn from_path(path: &str) -> Self {
    Self {
      name: None,
      path: path.to_string(),
      network_bits: None,
      quantization: None,
      forward: None,
      backward: None,
    }
  }

  pub fn overrides(&self) -> NetworkOverrides {
    NetworkOverrides {
      name: self.name.clone(),
      network_bits: self.network_bits,
      quantization: self.quantization,
      forward: self.forward,
      backward: self.backward,
    }
  }

  /// Name used to match experiment filters before the file is loaded
  pub fn label(&self) -> String {
    match &self.name {
      Some(name) => name.clone(),
      None => Path::new(&self.path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| self.path.clone()),
    }
  }
}

/// One `[[experiments]]` entry, kept as text until validated
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExperimentSection {
  pub architecture: String,
  #[serde(default = "default_task")]
  pub task: String,
  /// Networks this experiment applies to, empty for all
  #[serde(default)]
  pub networks: Vec<String>,
  #[serde(default = "default_array")]
  pub rows: usize,
  #[serde(default = "default_array")]
  pub columns: usize,
  #[serde(default = "default_array")]
  pub lanes: usize,
  #[serde(default = "default_array")]
  pub tiles: usize,
  #[serde(default = "default_precision_granularity")]
  pub precision_granularity: usize,
  #[serde(default)]
  pub column_registers: usize,
  #[serde(default)]
  pub booth_encoding: bool,
  #[serde(default)]
  pub zero_count: bool,
  #[serde(default)]
  pub leading_bit: bool,
  #[serde(default = "default_lookahead")]
  pub lookahead_h: usize,
  #[serde(default = "default_lookaside")]
  pub lookaside_d: usize,
  #[serde(default = "default_search_shape")]
  pub search_shape: String,
  /// Dump the weight schedule as JSON when the task is `Schedule`
  #[serde(default)]
  pub dump_schedule: bool,
  #[serde(default)]
  pub memory: GlobalBufferConfig,
  #[serde(default)]
  pub local_buffer: LocalBufferConfig,
  #[serde(default)]
  pub ppu: PpuConfig,
}

fn default_task() -> String {
  Task::Cycles.to_string()
}

fn default_array() -> usize {
  16
}

fn default_precision_granularity() -> usize {
  256
}

fn default_lookahead() -> usize {
  2
}

fn default_lookaside() -> usize {
  5
}

fn default_search_shape() -> String {
  "L".to_string()
}

impl ExperimentSection {
  pub fn new(architecture: &str) -> Self {
    Self {
      architecture: architecture.to_string(),
      task: default_task(),
      networks: Vec::new(),
      rows: default_array(),
      columns: default_array(),
      lanes: default_array(),
      tiles: default_array(),
      precision_granularity: default_precision_granularity(),
      column_registers: 0,
      booth_encoding: false,
      zero_count: false,
      leading_bit: false,
      lookahead_h: default_lookahead(),
      lookaside_d: default_lookaside(),
      search_shape: default_search_shape(),
      dump_schedule: false,
      memory: GlobalBufferConfig::default(),
      local_buffer: LocalBufferConfig::default(),
      ppu: PpuConfig::default(),
    }
  }

  pub fn applies_to(&self, network: &str) -> bool {
    self.networks.is_empty() || self.networks.iter().any(|n| n == network)
  }

  /// Check the experiment against one network and resolve its names into types
  pub fn validate(&self, network: &str) -> Result<Experiment> {
    let err = |parameter: &str, reason: String| SimError::config(network, parameter, reason);

    let arch: ArchKind = self.architecture.parse().map_err(|e| err("architecture", e))?;
    let task: Task = self.task.parse().map_err(|e| err("task", e))?;
    if task == Task::Schedule && !arch.is_tactical() {
      return Err(err("task", format!("Schedule task is only available for BitTactical, not {}", arch)));
    }

    for (name, value) in [
      ("rows", self.rows),
      ("columns", self.columns),
      ("lanes", self.lanes),
      ("tiles", self.tiles),
    ] {
      if value == 0 {
        return Err(err(name, "must be greater than 0".to_string()));
      }
    }

    let shape = SearchShape::parse(network, &self.search_shape, self.lookahead_h, self.lookaside_d)?;

    if arch.uses_precision_granularity() {
      let pg = self.precision_granularity;
      if pg == 0 || pg % self.lanes != 0 || (self.columns * self.lanes) % pg != 0 {
        return Err(err(
          "precision_granularity",
          format!(
            "{} must be a multiple of {} lanes and divide {} columns x {} lanes",
            pg, self.lanes, self.columns, self.lanes
          ),
        ));
      }
    }

    for (name, banks) in [
      ("memory.act_banks", self.memory.act_banks),
      ("memory.wgt_banks", self.memory.wgt_banks),
      ("memory.out_banks", self.memory.out_banks),
    ] {
      if !(1..=1024).contains(&banks) {
        return Err(err(name, format!("{} is outside 1..=1024", banks)));
      }
    }
    if self.memory.bank_width == 0 {
      return Err(err("memory.bank_width", "must be greater than 0".to_string()));
    }
    if self.local_buffer.rows == 0 {
      return Err(err("local_buffer.rows", "must be greater than 0".to_string()));
    }
    if self.ppu.inputs == 0 {
      return Err(err("ppu.inputs", "must be greater than 0".to_string()));
    }

    Ok(Experiment {
      arch,
      task,
      params: ArchParams {
        rows: self.rows,
        columns: self.columns,
        lanes: self.lanes,
        tiles: self.tiles,
        precision_granularity: self.precision_granularity,
        column_registers: self.column_registers,
        booth_encoding: self.booth_encoding,
        zero_count: self.zero_count,
        leading_bit: self.leading_bit,
      },
      scheduler: SchedulerConfig::new(self.lanes, self.lookahead_h, self.lookaside_d, shape),
      memory: self.memory.clone(),
      local: self.local_buffer,
      ppu: self.ppu,
      dump_schedule: self.dump_schedule,
    })
  }
}

/// A validated experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
  pub arch: ArchKind,
  pub task: Task,
  pub params: ArchParams,
  pub scheduler: SchedulerConfig,
  pub memory: GlobalBufferConfig,
  pub local: LocalBufferConfig,
  pub ppu: PpuConfig,
  pub dump_schedule: bool,
}

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub simulation: SimulationSection,
  #[serde(default)]
  pub networks: Vec<NetworkSection>,
  #[serde(default)]
  pub experiments: Vec<ExperimentSection>,
}

/// Command line values that replace configured ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
  pub network: Option<String>,
  pub arch: Option<String>,
  pub task: Option<String>,
  pub threads: Option<usize>,
  pub fast: bool,
  pub quiet: bool,
  pub output_dir: Option<String>,
  pub json: bool,
}

/// Load the built-in defaults
pub fn load_default_config() -> Result<AppConfig> {
  Ok(toml::from_str::<AppConfig>(include_str!("default.toml"))?)
}

/// Load a user configuration file
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
  let settings = Config::builder()
    .add_source(File::from(path).format(FileFormat::Toml))
    .build()?;
  Ok(settings.try_deserialize::<AppConfig>()?)
}

/// Layer `DNNSIM_SIMULATION__*` environment variables over the simulation section
pub fn apply_environment(config: &mut AppConfig) -> Result<()> {
  let env = Config::builder()
    .add_source(
      Environment::with_prefix("DNNSIM")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?;

  if let Ok(threads) = env.get::<usize>("simulation.threads") {
    config.simulation.threads = threads;
  }
  if let Ok(fast_mode) = env.get::<bool>("simulation.fast_mode") {
    config.simulation.fast_mode = fast_mode;
  }
  if let Ok(quiet) = env.get::<bool>("simulation.quiet") {
    config.simulation.quiet = quiet;
  }
  if let Ok(output_dir) = env.get::<String>("simulation.output_dir") {
    config.simulation.output_dir = output_dir;
  }
  if let Ok(json) = env.get::<bool>("simulation.json") {
    config.simulation.json = json;
  }
  Ok(())
}

/// Merge two configurations, the second one wins
pub fn merge_config(mut base: AppConfig, override_config: AppConfig) -> AppConfig {
  let defaults = SimulationSection::default();
  let sim = override_config.simulation;
  if sim.threads != defaults.threads {
    base.simulation.threads = sim.threads;
  }
  if sim.fast_mode {
    base.simulation.fast_mode = true;
  }
  if sim.quiet {
    base.simulation.quiet = true;
  }
  if sim.output_dir != defaults.output_dir {
    base.simulation.output_dir = sim.output_dir;
  }
  if sim.json {
    base.simulation.json = true;
  }

  if !override_config.networks.is_empty() {
    base.networks = override_config.networks;
  }
  if !override_config.experiments.is_empty() {
    base.experiments = override_config.experiments;
  }

  base
}

/// Apply command line values on top of the merged configuration
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &CliOverrides) {
  if let Some(path) = &cli.network {
    config.networks = vec![NetworkSection::from_path(path)];
  }
  if let Some(arch) = &cli.arch {
    // keep the first configured geometry and run a single experiment
    let mut experiment = config
      .experiments
      .first()
      .cloned()
      .unwrap_or_else(|| ExperimentSection::new(arch));
    experiment.architecture = arch.clone();
    experiment.networks.clear();
    config.experiments = vec![experiment];
  }
  if let Some(task) = &cli.task {
    if config.experiments.is_empty() {
      config.experiments.push(ExperimentSection::new(&ArchKind::DaDianNao.to_string()));
    }
    for experiment in &mut config.experiments {
      experiment.task = task.clone();
    }
  }
  if let Some(threads) = cli.threads {
    config.simulation.threads = threads;
  }
  if cli.fast {
    config.simulation.fast_mode = true;
  }
  if cli.quiet {
    config.simulation.quiet = true;
  }
  if let Some(dir) = &cli.output_dir {
    config.simulation.output_dir = dir.clone();
  }
  if cli.json {
    config.simulation.json = true;
  }
}

/// Run-wide checks; experiments are validated per network by the runner
pub fn validate_config(config: &AppConfig) -> Result<()> {
  if config.simulation.threads == 0 {
    return Err(SimError::config(ANY_NETWORK, "simulation.threads", "must be greater than 0"));
  }
  if config.networks.is_empty() {
    return Err(SimError::config(
      ANY_NETWORK,
      "networks",
      "no network configured, use [[networks]] or --network",
    ));
  }
  if let Some(network) = config.networks.iter().find(|n| n.path.trim().is_empty()) {
    return Err(SimError::config(network.label(), "path", "cannot be empty"));
  }
  if config.experiments.is_empty() {
    return Err(SimError::config(
      ANY_NETWORK,
      "experiments",
      "no experiment configured, use [[experiments]] or --arch",
    ));
  }
  Ok(())
}

/// Make relative network paths relative to `root`
pub fn resolve_paths(config: &mut AppConfig, root: &Path) {
  for network in &mut config.networks {
    network.path = resolve_single_path(&network.path, root);
  }
}

fn resolve_single_path(path_str: &str, root: &Path) -> String {
  let path = Path::new(path_str);
  if path_str.is_empty() || path.is_absolute() {
    return path_str.to_string();
  }
  root.join(path).to_string_lossy().to_string()
}

/// Load and merge configurations
///
/// 1. built-in defaults
/// 2. user file, networks resolved against its directory
/// 3. `DNNSIM_*` environment variables
/// 4. command line overrides
/// 5. run-wide validation
pub fn load_and_merge_configs(custom_config_path: Option<&Path>, cli: &CliOverrides) -> Result<AppConfig> {
  let mut config = load_default_config()?;

  if let Some(path) = custom_config_path {
    let mut custom = load_config_file(path)?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    resolve_paths(&mut custom, &root);
    config = merge_config(config, custom);
  }

  apply_environment(&mut config)?;
  apply_cli_overrides(&mut config, cli);
  validate_config(&config)?;

  Ok(config)
}
