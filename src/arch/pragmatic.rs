use super::{effectual_bits, sign_magnitude, ArchParams, ArchState, Architecture, ColumnSync, LayerContext};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Serial over the effectual activation bits only
#[derive(Debug, Clone)]
pub struct BitPragmatic {
  state: ArchState,
  booth_encoding: bool,
  zero_count: bool,
  sync: ColumnSync,
}

impl BitPragmatic {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
      booth_encoding: params.booth_encoding,
      zero_count: params.zero_count,
      sync: ColumnSync::new(params.column_registers),
    }
  }
}

impl Architecture for BitPragmatic {
  fn name(&self) -> &'static str {
    "BitPragmatic"
  }

  fn filename(&self) -> String {
    format!(
      "_R{}_C{}_CR{}{}",
      self.state.rows,
      self.state.columns,
      self.sync.registers(),
      if self.booth_encoding { "_booth" } else { "" }
    )
  }

  fn header(&self) -> String {
    let mut header = format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns);
    header += &format!("Number of registers per column: {}\n", self.sync.registers());
    if self.booth_encoding {
      header += "Booth-like Encoding\n";
    }
    if self.zero_count {
      header += "Zero count as one cycle\n";
    }
    header
  }

  fn compute_bits(&self, act: u32, _wgt: u32) -> u32 {
    let bits = self.state.ctx.network_bits;
    let bit_multiplications = effectual_bits(sign_magnitude(act, bits), self.booth_encoding) * bits as u32;
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
    let booth = self.booth_encoding;
    let costs: Vec<u64> = tiles
      .iter()
      .filter(|t| t.valid)
      .flat_map(|tile| work.column_activations(tile))
      .map(|column| {
        column
          .iter()
          .map(|&a| effectual_bits(sign_magnitude(a, bits), booth))
          .max()
          .unwrap_or(0)
          .max(1) as u64
      })
      .collect();
    if costs.is_empty() {
      return 1;
    }
    self.sync.step(&costs)
  }
}
