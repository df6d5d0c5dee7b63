use super::{dynamic_precision, sign_magnitude, ArchParams, ArchState, Architecture, ColumnSync, LayerContext};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Bit-serial activations trimmed to the precision each column group needs
#[derive(Debug, Clone)]
pub struct DynamicStripes {
  state: ArchState,
  lanes: usize,
  precision_granularity: usize,
  leading_bit: bool,
  zero_count: bool,
  sync: ColumnSync,
}

impl DynamicStripes {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
      lanes: params.lanes,
      precision_granularity: params.precision_granularity,
      leading_bit: params.leading_bit,
      zero_count: params.zero_count,
      sync: ColumnSync::new(params.column_registers),
    }
  }

  /// Columns sharing one precision decision
  fn group_columns(&self) -> usize {
    (self.precision_granularity / self.lanes.max(1)).max(1)
  }
}

impl Architecture for DynamicStripes {
  fn name(&self) -> &'static str {
    "DynamicStripes"
  }

  fn filename(&self) -> String {
    format!(
      "_R{}_C{}_PG{}_CR{}{}",
      self.state.rows,
      self.state.columns,
      self.precision_granularity,
      self.sync.registers(),
      if self.leading_bit { "_LB" } else { "" }
    )
  }

  fn header(&self) -> String {
    let mut header = format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns);
    header += &format!("Precision granularity: {}\n", self.precision_granularity);
    header += &format!("Number of registers per column: {}\n", self.sync.registers());
    if self.leading_bit {
      header += "Only leading bit for dynamic precisions\n";
    }
    header
  }

  fn compute_bits(&self, act: u32, _wgt: u32) -> u32 {
    let bits = self.state.ctx.network_bits;
    let prec = dynamic_precision([sign_magnitude(act, bits)], self.leading_bit);
    let bit_multiplications = prec * bits as u32;
    if bit_multiplications == 0 && self.zero_count {
      1
    } else {
      bit_multiplications
    }
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.sign_magnitude_representation(bits);
  }

  fn multiplex_columns(&self) -> bool {
    true
  }

  fn state(&self) -> &ArchState {
    &self.state
  }

  fn state_mut(&mut self) -> &mut ArchState {
    &mut self.state
  }

  fn configure_layer(&mut self, ctx: LayerContext) {
    self.sync.reset();
    self.state.configure(ctx, true);
  }

  fn step_cycles(&mut self, tiles: &[TileDescriptor], work: &TileWork) -> u64 {
    let bits = self.state.ctx.network_bits;
    let group = self.group_columns();
    let mut costs = Vec::new();
    for tile in tiles.iter().filter(|t| t.valid) {
      let columns = work.column_activations(tile);
      for chunk in columns.chunks(group) {
        let magnitudes = chunk.iter().flatten().map(|&a| sign_magnitude(a, bits));
        costs.push(dynamic_precision(magnitudes, self.leading_bit).max(1) as u64);
      }
    }
    if costs.is_empty() {
      return 1;
    }
    self.sync.step(&costs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_compute_bits_uses_dynamic_precision() {
    let mut arch = DynamicStripes::new(&ArchParams::default());
    arch.configure_layer(LayerContext::default());
    // sign-magnitude -6 keeps magnitude 0b110
    assert_eq!(arch.compute_bits(0x8006, 1), 2 * 16);
    assert_eq!(arch.compute_bits(0, 1), 0);
  }
}
