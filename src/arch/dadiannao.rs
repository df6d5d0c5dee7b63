use super::{ArchParams, ArchState, Architecture};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Bit-parallel baseline, one multiply-accumulate per lane per cycle
#[derive(Debug, Clone)]
pub struct DaDianNao {
  state: ArchState,
}

impl DaDianNao {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
    }
  }
}

impl Architecture for DaDianNao {
  fn name(&self) -> &'static str {
    "DaDianNao"
  }

  fn filename(&self) -> String {
    format!("_R{}_C{}", self.state.rows, self.state.columns)
  }

  fn header(&self) -> String {
    format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns)
  }

  fn compute_bits(&self, _act: u32, _wgt: u32) -> u32 {
    let bits = self.state.ctx.network_bits as u32;
    bits * bits
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.twos_complement_representation(bits);
  }

  fn state(&self) -> &ArchState {
    &self.state
  }

  fn state_mut(&mut self) -> &mut ArchState {
    &mut self.state
  }

  fn step_cycles(&mut self, _tiles: &[TileDescriptor], _work: &TileWork) -> u64 {
    1
  }
}
