use super::{ArchParams, ArchState, Architecture};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Bit-serial activations at the profiled per-layer precision
#[derive(Debug, Clone)]
pub struct Stripes {
  state: ArchState,
}

impl Stripes {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
    }
  }

  fn act_prec(&self) -> u64 {
    self.state.ctx.act_precision.bits.max(1) as u64
  }
}

impl Architecture for Stripes {
  fn name(&self) -> &'static str {
    "Stripes"
  }

  fn filename(&self) -> String {
    format!("_R{}_C{}", self.state.rows, self.state.columns)
  }

  fn header(&self) -> String {
    format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns)
  }

  fn compute_bits(&self, _act: u32, _wgt: u32) -> u32 {
    self.act_prec() as u32 * self.state.ctx.network_bits as u32
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.twos_complement_representation(bits);
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

  fn step_cycles(&mut self, _tiles: &[TileDescriptor], _work: &TileWork) -> u64 {
    self.act_prec()
  }
}
