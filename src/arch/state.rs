use super::{ArchParams, LayerContext, TileTiming};
use crate::simulator::tiling::TileDescriptor;

/// Cycle and PE counters of a PE array plus the column pipeline of
/// multiplexed linear layers
#[derive(Debug, Clone)]
pub struct ArchState {
  pub rows: usize,
  pub columns: usize,
  pub ctx: LayerContext,
  linear: bool,
  cycles: u64,
  scheduled_pe: u64,
  idle_pe: u64,
  compute_cycles: Vec<u64>,
  column_cycles: Vec<u64>,
  column_index: usize,
}

impl ArchState {
  pub fn new(params: &ArchParams) -> Self {
    assert!(params.rows > 0 && params.columns > 0, "PE array needs rows and columns");
    Self {
      rows: params.rows,
      columns: params.columns,
      ctx: LayerContext::default(),
      linear: false,
      cycles: 0,
      scheduled_pe: 0,
      idle_pe: 0,
      compute_cycles: vec![0; params.columns],
      column_cycles: vec![0; params.columns],
      column_index: 0,
    }
  }

  pub fn configure(&mut self, ctx: LayerContext, multiplex_columns: bool) {
    self.ctx = ctx;
    self.linear = ctx.linear && multiplex_columns;
    self.cycles = 0;
    self.scheduled_pe = 0;
    self.idle_pe = 0;
    self.compute_cycles.iter_mut().for_each(|c| *c = 0);
    self.column_cycles.iter_mut().for_each(|c| *c = 0);
    self.column_index = 0;
  }

  /// Account a batch busy for `step` cycles starting at `now`
  pub fn advance(&mut self, tiles: &[TileDescriptor], step: u64, now: u64) -> TileTiming {
    let timing = if self.linear {
      let column = self.column_index;
      self.cycles = self.cycles.max(self.compute_cycles[column]);
      self.compute_cycles[column] = self.cycles + step;
      self.cycles += 1;

      self.column_cycles[column] = now + step;
      self.column_index = (column + 1) % self.columns;
      TileTiming {
        ready_cycle: self.column_cycles[self.column_index].max(now + 1),
        done_cycle: now + step,
      }
    } else {
      self.cycles += step;
      TileTiming {
        ready_cycle: now + step,
        done_cycle: now + step,
      }
    };

    for tile in tiles {
      assert!(
        tile.windows.len() <= self.columns && tile.filters.len() <= self.rows,
        "tile of {} windows x {} filters exceeds a {}x{} PE array",
        tile.windows.len(),
        tile.filters.len(),
        self.rows,
        self.columns
      );
      if !tile.valid {
        let capacity = if self.linear { self.rows } else { self.rows * self.columns };
        self.idle_pe += capacity as u64;
      } else if self.linear {
        self.scheduled_pe += tile.filters.len() as u64;
        self.idle_pe += (self.rows - tile.filters.len()) as u64;
      } else {
        let busy = tile.windows.len() * tile.filters.len();
        self.scheduled_pe += busy as u64;
        self.idle_pe += (self.rows * self.columns - busy) as u64;
      }
    }
    timing
  }

  /// Drain the column pipeline of the layer
  pub fn last_done_cycle(&self) -> u64 {
    self.column_cycles.iter().copied().max().unwrap_or(0)
  }

  pub fn cycles(&self) -> u64 {
    if self.linear {
      self.cycles.max(self.compute_cycles.iter().copied().max().unwrap_or(0))
    } else {
      self.cycles
    }
  }

  pub fn scheduled_pe(&self) -> u64 {
    self.scheduled_pe
  }

  pub fn idle_pe(&self) -> u64 {
    self.idle_pe
  }
}

/// Column groups running ahead of each other by up to `registers` steps.
///
/// Each step adds a per-group cost; groups resynchronise after
/// `registers + 1` steps, so the array advances by the growth of the
/// slowest group.
#[derive(Debug, Clone)]
pub struct ColumnSync {
  registers: usize,
  pending: Vec<u64>,
  steps: usize,
}

impl ColumnSync {
  pub fn new(registers: usize) -> Self {
    Self {
      registers,
      pending: Vec::new(),
      steps: 0,
    }
  }

  pub fn registers(&self) -> usize {
    self.registers
  }

  pub fn reset(&mut self) {
    self.pending.clear();
    self.steps = 0;
  }

  /// Add one step of per-group costs and return the cycles it exposes
  pub fn step(&mut self, costs: &[u64]) -> u64 {
    if self.pending.len() < costs.len() {
      self.pending.resize(costs.len(), 0);
    }
    let before = self.pending.iter().copied().max().unwrap_or(0);
    for (pending, &cost) in self.pending.iter_mut().zip(costs) {
      *pending += cost;
    }
    let after = self.pending.iter().copied().max().unwrap_or(0);
    self.steps += 1;
    if self.steps > self.registers {
      self.reset();
    }
    after - before
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tile(windows: usize, filters: usize) -> TileDescriptor {
    TileDescriptor {
      windows: vec![(0, 0); windows],
      filters: (0..filters).collect(),
      valid: true,
      write: true,
      ppu: false,
      column: 0,
    }
  }

  #[test]
  fn test_pe_accounting() {
    let mut state = ArchState::new(&ArchParams::default());
    state.configure(LayerContext::default(), true);
    let timing = state.advance(&[tile(16, 16), tile(4, 16)], 3, 10);
    assert_eq!(timing, TileTiming { ready_cycle: 13, done_cycle: 13 });
    assert_eq!(state.scheduled_pe(), 256 + 64);
    assert_eq!(state.idle_pe(), 192);
    assert_eq!(state.cycles(), 3);
  }

  #[test]
  fn test_multiplexed_columns_overlap() {
    let params = ArchParams {
      columns: 2,
      ..ArchParams::default()
    };
    let mut state = ArchState::new(&params);
    let ctx = LayerContext {
      linear: true,
      ..LayerContext::default()
    };
    state.configure(ctx, true);
    let first = state.advance(&[tile(1, 16)], 8, 0);
    assert_eq!(first, TileTiming { ready_cycle: 1, done_cycle: 8 });
    let second = state.advance(&[tile(1, 8)], 8, 1);
    // column 0 is busy until cycle 8
    assert_eq!(second.ready_cycle, 8);
    assert_eq!(state.idle_pe(), 8);
  }

  #[test]
  fn test_invalid_tile_is_idle() {
    let mut state = ArchState::new(&ArchParams::default());
    state.configure(LayerContext::default(), false);
    let mut empty = tile(4, 16);
    empty.valid = false;
    state.advance(&[tile(4, 16), empty], 1, 0);
    assert_eq!(state.scheduled_pe(), 64);
    assert_eq!(state.idle_pe(), 192 + 256);
  }

  #[test]
  #[should_panic]
  fn test_oversized_tile_panics() {
    let mut state = ArchState::new(&ArchParams::default());
    state.advance(&[tile(17, 1)], 1, 0);
  }

  #[test]
  fn test_column_registers_hide_imbalance() {
    let mut sync = ColumnSync::new(0);
    assert_eq!(sync.step(&[3, 1]), 3);
    assert_eq!(sync.step(&[1, 3]), 3);

    let mut ahead = ColumnSync::new(1);
    assert_eq!(ahead.step(&[3, 1]), 3);
    assert_eq!(ahead.step(&[1, 3]), 1);
  }
}
