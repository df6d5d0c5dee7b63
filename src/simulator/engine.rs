use log::{debug, trace};

use crate::arch::Architecture;
use crate::memory::{GlobalBuffer, GlobalBufferStats, LocalBuffer};
use crate::simulator::config::Experiment;
use crate::simulator::ppu::Ppu;
use crate::simulator::tiling::{mark_step, partition, steps, LayerWork, TileWork};

/// Timing and utilization of one layer for one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerTiming {
  pub cycles: u64,
  /// Cycles the PE array spent computing
  pub compute_cycles: u64,
  /// Cycles waiting for read data
  pub stall_cycles: u64,
  /// Cycles waiting for outputs to retire
  pub write_stall_cycles: u64,
  /// Cycles spent in the post-processing unit
  pub ppu_cycles: u64,
  pub scheduled_pe: u64,
  pub idle_pe: u64,
  pub descriptors: u64,
  pub steps: u64,
  pub memory: GlobalBufferStats,
}

/// One accelerator instance: architecture plus on-chip memories.
///
/// Instances are never shared between threads; every worker builds its own.
pub struct Engine {
  arch: Box<dyn Architecture>,
  global: GlobalBuffer,
  act_local: LocalBuffer,
  out_local: LocalBuffer,
  ppu: Ppu,
  rows: usize,
  columns: usize,
  tiles: usize,
  lanes: usize,
}

impl Engine {
  pub fn new(experiment: &Experiment) -> Self {
    let params = &experiment.params;
    Self {
      arch: experiment.arch.build(params),
      global: GlobalBuffer::new(experiment.memory.clone()),
      act_local: LocalBuffer::from_config(&experiment.local),
      out_local: LocalBuffer::from_config(&experiment.local),
      ppu: Ppu::new(experiment.ppu),
      rows: params.rows,
      columns: params.columns,
      tiles: params.tiles,
      lanes: params.lanes,
    }
  }

  pub fn arch(&self) -> &dyn Architecture {
    self.arch.as_ref()
  }

  pub fn global_buffer(&self) -> &GlobalBuffer {
    &self.global
  }

  /// Simulate every recursion of `work` for one sample, starting at cycle 0
  pub fn run_layer(&mut self, work: &LayerWork, sample: usize) -> LayerTiming {
    self.arch.configure_layer(work.context());
    self.global.configure_layer();
    self.act_local.configure_layer();
    self.out_local.configure_layer();

    let descriptors = partition(work, self.rows, self.columns, self.arch.multiplex_columns());
    let mut now = 0u64;
    let mut issue = 0u64;
    let mut last_done = 0u64;
    let mut stall_cycles = 0u64;
    let mut write_stall_cycles = 0u64;
    let mut ppu_cycles = 0u64;
    let mut step_count = 0u64;

    for recursion in 0..work.recursions {
      let act_index = work.act_index(recursion, sample);
      for chunk in descriptors.chunks(self.tiles) {
        let mut batch = chunk.to_vec();
        let batch_steps = steps(work, &batch, self.lanes);
        let last = batch_steps.len().saturating_sub(1);
        for (i, &step) in batch_steps.iter().enumerate() {
          mark_step(work, &mut batch, step, i == last);
          let tile_work = TileWork::new(work, act_index, step, self.lanes);

          // a row refills once its previous contents are consumed
          issue = issue.max(self.act_local.fifo_done_cycle());
          let act_ready = self.global.act_read_request(&tile_work.act_addresses(&batch), issue);
          let wgt_ready = self.global.wgt_read_request(&tile_work.wgt_addresses(&batch), issue);
          self.act_local.read_request(act_ready.max(wgt_ready));

          if !self.act_local.data_ready(now) {
            let ready = self.act_local.fifo_ready_cycle();
            trace!("layer {} stalls {} cycles for data at {}", work.name, ready - now, now);
            stall_cycles += ready - now;
            self.global.add_read_stall(ready - now);
            now = ready;
          }
          self.act_local.evict_data(now);

          let timing = self.arch.process_tiles(&batch, &tile_work, now);
          self.act_local.update_done_cycle(timing.done_cycle);
          self.act_local.update_fifo();

          let post = self.ppu.delay(&batch);
          ppu_cycles += post;
          let done = timing.done_cycle + post;
          last_done = last_done.max(done);

          let outputs = tile_work.out_addresses(&batch);
          if !outputs.is_empty() {
            let mut at = done;
            if !self.out_local.write_ready(at) {
              let free = self.out_local.fifo_done_cycle();
              write_stall_cycles += free - at;
              self.global.add_write_stall(free - at);
              at = free;
            }
            self.out_local.write_request(at);
            let written = self.global.write_request(&outputs, self.out_local.fifo_ready_cycle());
            self.out_local.update_done_cycle(written);
            self.out_local.update_fifo();
          }

          now = now.max(timing.ready_cycle + post);
          step_count += 1;
        }
      }
    }

    let mut end = now.max(last_done).max(self.arch.state().last_done_cycle());
    if !self.global.write_done(end) {
      let retired = self.global.write_ready_cycle();
      write_stall_cycles += retired - end;
      self.global.add_write_stall(retired - end);
      end = retired;
    }

    let timing = LayerTiming {
      cycles: end,
      compute_cycles: self.arch.cycles(),
      stall_cycles,
      write_stall_cycles,
      ppu_cycles,
      scheduled_pe: self.arch.scheduled_pe(),
      idle_pe: self.arch.idle_pe(),
      descriptors: (descriptors.len() * work.recursions) as u64,
      steps: step_count,
      memory: self.global.stats(),
    };
    self.global.evict_data(true, true);

    debug!(
      "{} layer {} sample {}: {} cycles, {} stall, {} descriptors",
      self.arch.name(),
      work.name,
      sample,
      timing.cycles,
      timing.stall_cycles,
      timing.descriptors
    );
    timing
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::{ArchKind, ArchParams};
  use crate::base::{Layer, LayerKind, Network, Tensor};
  use crate::memory::{GlobalBufferConfig, LocalBufferConfig};
  use crate::simulator::ppu::PpuConfig;
  use crate::scheduler::{schedule_layer, SchedulerConfig, SearchShape};
  use crate::simulator::sim::mode::Task;

  fn experiment(arch: ArchKind) -> Experiment {
    let params = ArchParams::default();
    Experiment {
      arch,
      task: Task::Cycles,
      scheduler: SchedulerConfig::new(params.lanes, 2, 5, SearchShape::L),
      params,
      memory: GlobalBufferConfig::default(),
      local: LocalBufferConfig::default(),
      ppu: PpuConfig::default(),
      dump_schedule: false,
    }
  }

  fn conv_network() -> Network {
    let act: Vec<i64> = (0..3 * 8 * 8).map(|i| (i % 7) as i64).collect();
    let wgt: Vec<i64> = (0..16 * 3 * 3 * 3).map(|i| (i % 5) as i64 - 2).collect();
    let layer = Layer::new(LayerKind::Convolution, "conv1", 1, 1).with_tensors(
      Tensor::from_signed(vec![1, 3, 8, 8], &act, 16),
      Tensor::from_signed(vec![16, 3, 3, 3], &wgt, 16),
    );
    Network::new("tiny", 16).with_layers(vec![layer])
  }

  fn prepare(network: &Network, experiment: &Experiment) -> LayerWork {
    let arch = experiment.arch.build(&experiment.params);
    LayerWork::prepare(network, 0, arch.as_ref()).unwrap()
  }

  #[test]
  fn test_dadiannao_conv_layer() {
    let network = conv_network();
    let experiment = experiment(ArchKind::DaDianNao);
    let work = prepare(&network, &experiment);
    let mut engine = Engine::new(&experiment);
    let timing = engine.run_layer(&work, 0);

    // 4 descriptors fit in one batch of 16 tiles, 9 kernel positions of 3 channels
    assert_eq!(timing.descriptors, 4);
    assert_eq!(timing.steps, 9);
    assert_eq!(timing.compute_cycles, 9);
    assert!(timing.cycles >= timing.compute_cycles);
    assert_eq!(timing.scheduled_pe, 4 * 16 * 16 * 9);
    assert_eq!(timing.idle_pe, 0);
    // 1024 outputs through 16 PPU inputs
    assert_eq!(timing.ppu_cycles, 64);
    assert!(timing.memory.act_reads > 0 && timing.memory.out_writes > 0);
  }

  #[test]
  fn test_ppu_delay_extends_layer() {
    let network = conv_network();
    let mut bypass = experiment(ArchKind::DaDianNao);
    bypass.ppu.delay = 0;
    let work = prepare(&network, &bypass);
    let direct = Engine::new(&bypass).run_layer(&work, 0);
    let processed = Engine::new(&experiment(ArchKind::DaDianNao)).run_layer(&work, 0);
    assert_eq!(direct.ppu_cycles, 0);
    assert!(processed.cycles > direct.cycles);
    assert_eq!(processed.compute_cycles, direct.compute_cycles);
  }

  #[test]
  fn test_layer_runs_are_independent() {
    let network = conv_network();
    let experiment = experiment(ArchKind::Stripes);
    let work = prepare(&network, &experiment);
    let mut engine = Engine::new(&experiment);
    let first = engine.run_layer(&work, 0);
    let second = engine.run_layer(&work, 0);
    assert_eq!(first, second);
  }

  #[test]
  fn test_slow_memory_stalls() {
    let network = conv_network();
    let mut slow = experiment(ArchKind::DaDianNao);
    slow.memory.read_delay = 50;
    let work = prepare(&network, &slow);
    let fast = Engine::new(&experiment(ArchKind::DaDianNao)).run_layer(&work, 0);
    let stalled = Engine::new(&slow).run_layer(&work, 0);
    assert!(stalled.stall_cycles > fast.stall_cycles);
    assert!(stalled.cycles > fast.cycles);
    assert_eq!(stalled.compute_cycles, fast.compute_cycles);
  }

  #[test]
  fn test_tactical_skips_empty_steps() {
    let act: Vec<i64> = vec![3; 4];
    let wgt: Vec<i64> = vec![5, 0, 0, 0];
    let layer = Layer::new(LayerKind::InnerProduct, "fc", 1, 0).with_tensors(
      Tensor::from_signed(vec![1, 4], &act, 16),
      Tensor::from_signed(vec![1, 4], &wgt, 16),
    );
    let network = Network::new("fc", 16).with_layers(vec![layer]);
    let mut experiment = experiment(ArchKind::BitTacticalE);
    experiment.params.lanes = 1;
    experiment.scheduler.lanes = 1;
    let mut work = prepare(&network, &experiment);
    let schedule = schedule_layer(&work.wgt, work.act_channels(), &experiment.scheduler);
    work = work.with_schedule(schedule);

    let timing = Engine::new(&experiment).run_layer(&work, 0);
    assert_eq!(timing.steps, 1);
  }

  #[test]
  fn test_empty_filter_group_is_idle() {
    let act: Vec<i64> = vec![3; 4];
    let wgt: Vec<i64> = vec![1, 1, 1, 1, 0, 0, 0, 0];
    let layer = Layer::new(LayerKind::Convolution, "conv", 1, 0).with_tensors(
      Tensor::from_signed(vec![1, 4, 1, 1], &act, 16),
      Tensor::from_signed(vec![2, 4, 1, 1], &wgt, 16),
    );
    let network = Network::new("conv", 16).with_layers(vec![layer]);
    let mut experiment = experiment(ArchKind::BitTacticalE);
    experiment.params.rows = 1;
    experiment.params.lanes = 4;
    experiment.scheduler.lanes = 4;
    let mut work = prepare(&network, &experiment);
    let schedule = schedule_layer(&work.wgt, work.act_channels(), &experiment.scheduler);
    work = work.with_schedule(schedule);

    let timing = Engine::new(&experiment).run_layer(&work, 0);
    assert_eq!(timing.steps, 1);
    assert_eq!(timing.descriptors, 2);
    // the all-zero filter occupies its own tile and does no work
    assert_eq!(timing.scheduled_pe, 1);
    assert_eq!(timing.idle_pe, 31);
    assert!(timing.memory.out_writes > 0);
  }
}
