use crate::arch::Architecture;
use crate::simulator::tiling::{dense_steps, partition, LayerWork, TileWork};

/// Bit-level work of one layer against a bit-parallel baseline
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerPotentials {
  pub bit_multiplications: u64,
  pub baseline_multiplications: u64,
  /// Percentage of baseline work removed
  pub work_reduction: f64,
  pub speedup: f64,
}

impl LayerPotentials {
  fn new(bit_multiplications: u64, baseline_multiplications: u64) -> Self {
    let (work_reduction, speedup) = if baseline_multiplications == 0 {
      (0.0, 1.0)
    } else if bit_multiplications == 0 {
      (100.0, f64::INFINITY)
    } else {
      let ratio = bit_multiplications as f64 / baseline_multiplications as f64;
      (100.0 * (1.0 - ratio), 1.0 / ratio)
    };
    Self {
      bit_multiplications,
      baseline_multiplications,
      work_reduction,
      speedup,
    }
  }
}

/// Count the bit multiplications of every (activation, weight) pair the
/// layer performs for one sample, without timing
pub fn layer_potentials(
  arch: &mut dyn Architecture,
  work: &LayerWork,
  sample: usize,
  rows: usize,
  columns: usize,
  lanes: usize,
) -> LayerPotentials {
  arch.configure_layer(work.context());
  let baseline = (work.network_bits as u64) * (work.network_bits as u64);
  let tiles = partition(work, rows, columns, false);
  let steps = dense_steps(work, lanes);

  let mut bits = 0u64;
  let mut pairs = 0u64;
  for recursion in 0..work.recursions {
    let act_index = work.act_index(recursion, sample);
    for &step in &steps {
      let tile_work = TileWork::new(work, act_index, step, lanes);
      for tile in tiles.iter().filter(|t| t.valid) {
        for operand in tile_work.operands(tile) {
          bits += arch.compute_bits(operand.act, operand.wgt) as u64;
          pairs += 1;
        }
      }
    }
  }
  LayerPotentials::new(bits, pairs * baseline)
}
