use log::{error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::config::{AppConfig, Experiment};
use super::engine::Engine;
use super::potentials::layer_potentials;
use super::sim::mode::{SimConfig, Task};
use super::tiling::{compute_layers, LayerWork};
use super::utils::report::{print_report, write_report};
use super::utils::stats::{Aggregation, SeriesId, Stats};
use crate::arch::ArchKind;
use crate::base::Network;
use crate::error::Result;
use crate::scheduler::{schedule_layer, Schedule};
use crate::stat_record;

/// Weight schedule of one layer, dumped as JSON
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleDump {
  pub layer: String,
  pub schedule: Schedule,
}

/// Statistics of one experiment on one network
#[derive(Debug)]
pub struct ExperimentReport {
  pub network: String,
  pub arch: ArchKind,
  pub task: Task,
  /// Report file name without extension
  pub filename: String,
  pub header: String,
  pub stats: Stats,
  pub schedules: Vec<ScheduleDump>,
}

#[derive(Debug, Clone, Copy)]
struct CycleSeries {
  cycles: SeriesId,
  compute_cycles: SeriesId,
  stall_cycles: SeriesId,
  write_stall_cycles: SeriesId,
  ppu_cycles: SeriesId,
  scheduled_pe: SeriesId,
  idle_pe: SeriesId,
  act_reads: SeriesId,
  wgt_reads: SeriesId,
  out_writes: SeriesId,
  act_bank_conflicts: SeriesId,
  wgt_bank_conflicts: SeriesId,
  out_bank_conflicts: SeriesId,
}

impl CycleSeries {
  fn register(stats: &Stats) -> Self {
    let total = |name: &str| stats.register(name, Aggregation::AverageTotal);
    Self {
      cycles: total("cycles"),
      compute_cycles: total("compute_cycles"),
      stall_cycles: total("stall_cycles"),
      write_stall_cycles: total("write_stall_cycles"),
      ppu_cycles: total("ppu_cycles"),
      scheduled_pe: total("scheduled_pe"),
      idle_pe: total("idle_pe"),
      act_reads: total("act_reads"),
      wgt_reads: total("wgt_reads"),
      out_writes: total("out_writes"),
      act_bank_conflicts: total("act_bank_conflicts"),
      wgt_bank_conflicts: total("wgt_bank_conflicts"),
      out_bank_conflicts: total("out_bank_conflicts"),
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct PotentialSeries {
  bit_multiplications: SeriesId,
  baseline_multiplications: SeriesId,
  work_reduction: SeriesId,
  speedup: SeriesId,
}

impl PotentialSeries {
  fn register(stats: &Stats) -> Self {
    Self {
      bit_multiplications: stats.register("bit_multiplications", Aggregation::AverageTotal),
      baseline_multiplications: stats.register("baseline_multiplications", Aggregation::AverageTotal),
      work_reduction: stats.register("work_reduction", Aggregation::Average),
      speedup: stats.register("speedup", Aggregation::Average),
    }
  }
}

/// Runs every configured experiment on every configured network
pub struct Simulator {
  config: AppConfig,
}

impl Simulator {
  pub fn new(config: AppConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  /// Run all experiments, print and write their reports
  pub fn run(&self) -> Result<Vec<ExperimentReport>> {
    let reports = self.run_experiments();
    let dir = Path::new(&self.config.simulation.output_dir);
    for report in &reports {
      print_report(report);
      write_report(report, dir, self.config.simulation.json)?;
    }
    Ok(reports)
  }

  /// Run all experiments without writing anything. A network that fails to
  /// load or an experiment that fails validation is logged and skipped.
  pub fn run_experiments(&self) -> Vec<ExperimentReport> {
    let sim = self.config.simulation.sim_config();
    let mut reports = Vec::new();

    for section in &self.config.networks {
      let network = match Network::load_json_with(Path::new(&section.path), &section.overrides()) {
        Ok(network) => network,
        Err(e) => {
          error!("skipping network {}: {}", section.path, e);
          continue;
        },
      };
      let label = section.label();

      for experiment in self
        .config
        .experiments
        .iter()
        .filter(|e| e.applies_to(&label) || e.applies_to(&network.name))
      {
        let experiment = match experiment.validate(&network.name) {
          Ok(experiment) => experiment,
          Err(e) => {
            error!("{}", e);
            continue;
          },
        };
        reports.push(run_experiment(&network, &experiment, sim));
      }
    }
    reports
  }
}

/// Prepare every compute layer of `network` and run one experiment on it
pub fn run_experiment(network: &Network, experiment: &Experiment, sim: SimConfig) -> ExperimentReport {
  let arch = experiment.arch.build(&experiment.params);
  info!("running {} {} on {}", experiment.arch, experiment.task, network.name);

  let mut layers: Vec<LayerWork> = Vec::new();
  for (index, _) in compute_layers(network) {
    match LayerWork::prepare(network, index, arch.as_ref()) {
      Ok(work) if arch.needs_scheduling() => {
        let schedule = schedule_layer(&work.wgt, work.act_channels(), &experiment.scheduler);
        layers.push(work.with_schedule(schedule));
      },
      Ok(work) => layers.push(work),
      Err(e) => error!("{}", e),
    }
  }
  if layers.is_empty() {
    warn!("network {} has no layer to simulate", network.name);
  }

  let samples = if sim.fast_mode { 1 } else { network.batches().max(1) };
  let names: Vec<String> = layers.iter().map(|w| w.name.clone()).collect();

  let mut header = format!("Network: {}\nTask: {}\nArchitecture: {}\n", network.name, experiment.task, arch.name());
  header += &arch.header();
  let mut filename = format!("{}_{}_{}{}", network.name, experiment.task, arch.name(), arch.filename());
  let mut schedules = Vec::new();

  let stats = match experiment.task {
    Task::Schedule => {
      let stats = Stats::new(names, 1);
      record_schedules(&stats, &layers);
      if experiment.dump_schedule {
        schedules = layers
          .iter()
          .filter_map(|w| {
            w.schedule.clone().map(|schedule| ScheduleDump {
              layer: w.name.clone(),
              schedule,
            })
          })
          .collect();
      }
      let config = &experiment.scheduler;
      header += &format!(
        "Search shape: {}\nLookahead: {}\nLookaside: {}\n",
        config.shape, config.lookahead_h, config.lookaside_d
      );
      stats
    },
    Task::Cycles => {
      let stats = Stats::new(names, samples);
      let series = CycleSeries::register(&stats);
      run_samples(sim.threads, samples, || Engine::new(experiment), |engine, sample| {
        for (l, work) in layers.iter().enumerate().filter(|(_, w)| sample < w.samples) {
          let timing = engine.run_layer(work, sample);
          stat_record!(stats, series.cycles, l, sample, timing.cycles);
          stat_record!(stats, series.compute_cycles, l, sample, timing.compute_cycles);
          stat_record!(stats, series.stall_cycles, l, sample, timing.stall_cycles);
          stat_record!(stats, series.write_stall_cycles, l, sample, timing.write_stall_cycles);
          stat_record!(stats, series.ppu_cycles, l, sample, timing.ppu_cycles);
          stat_record!(stats, series.scheduled_pe, l, sample, timing.scheduled_pe);
          stat_record!(stats, series.idle_pe, l, sample, timing.idle_pe);
          stat_record!(stats, series.act_reads, l, sample, timing.memory.act_reads);
          stat_record!(stats, series.wgt_reads, l, sample, timing.memory.wgt_reads);
          stat_record!(stats, series.out_writes, l, sample, timing.memory.out_writes);
          stat_record!(stats, series.act_bank_conflicts, l, sample, timing.memory.act_bank_conflicts);
          stat_record!(stats, series.wgt_bank_conflicts, l, sample, timing.memory.wgt_bank_conflicts);
          stat_record!(stats, series.out_bank_conflicts, l, sample, timing.memory.out_bank_conflicts);
        }
      });
      let engine = Engine::new(experiment);
      header += &engine.global_buffer().header();
      header += &format!("Local buffer rows: {}\n", experiment.local.rows);
      header += &format!("PPU inputs: {}\nPPU delay: {}\n", experiment.ppu.inputs, experiment.ppu.delay);
      filename += &engine.global_buffer().filename();
      stats
    },
    Task::Potentials => {
      let stats = Stats::new(names, samples);
      let series = PotentialSeries::register(&stats);
      let params = &experiment.params;
      run_samples(sim.threads, samples, || experiment.arch.build(params), |arch, sample| {
        for (l, work) in layers.iter().enumerate().filter(|(_, w)| sample < w.samples) {
          let result = layer_potentials(arch.as_mut(), work, sample, params.rows, params.columns, params.lanes);
          stat_record!(stats, series.bit_multiplications, l, sample, result.bit_multiplications);
          stat_record!(stats, series.baseline_multiplications, l, sample, result.baseline_multiplications);
          stat_record!(stats, series.work_reduction, l, sample, result.work_reduction);
          stat_record!(stats, series.speedup, l, sample, result.speedup);
        }
      });
      stats
    },
  };

  info!("finished {} {} on {}", experiment.arch, experiment.task, network.name);
  ExperimentReport {
    network: network.name.clone(),
    arch: experiment.arch,
    task: experiment.task,
    filename,
    header,
    stats,
    schedules,
  }
}

fn record_schedules(stats: &Stats, layers: &[LayerWork]) {
  let dense_steps = stats.register("dense_steps", Aggregation::Sum);
  let effectual_steps = stats.register("effectual_steps", Aggregation::Sum);
  let promotions = stats.register("promotions", Aggregation::Sum);
  let bubbles = stats.register("bubbles", Aggregation::Sum);
  let speedup = stats.register("speedup", Aggregation::Average);

  for (l, work) in layers.iter().enumerate() {
    let Some(schedule) = &work.schedule else { continue };
    let summary = schedule.stats();
    let dense = summary.dense_steps * schedule.num_filters();
    stat_record!(stats, dense_steps, l, 0, dense);
    stat_record!(stats, effectual_steps, l, 0, summary.effectual_steps);
    stat_record!(stats, promotions, l, 0, summary.promotions);
    stat_record!(stats, bubbles, l, 0, summary.bubbles);
    let ratio = if summary.effectual_steps == 0 {
      1.0
    } else {
      dense as f64 / summary.effectual_steps as f64
    };
    stat_record!(stats, speedup, l, 0, ratio);
  }
}

/// Hand sample indices to up to `threads` scoped workers, each with its own
/// state built by `init`
fn run_samples<S, I, F>(threads: usize, samples: usize, init: I, run: F)
where
  I: Fn() -> S + Sync,
  F: Fn(&mut S, usize) + Sync,
{
  let next = AtomicUsize::new(0);
  let workers = threads.clamp(1, samples.max(1));
  thread::scope(|scope| {
    for _ in 0..workers {
      scope.spawn(|| {
        let mut state = init();
        loop {
          let sample = next.fetch_add(1, Ordering::Relaxed);
          if sample >= samples {
            break;
          }
          run(&mut state, sample);
        }
      });
    }
  });
}
