use super::{effectual_bits, ArchParams, ArchState, Architecture};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Term-serial over both operands: cost is the product of their effectual bits
#[derive(Debug, Clone)]
pub struct Laconic {
  state: ArchState,
  booth_encoding: bool,
  zero_count: bool,
}

impl Laconic {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
      booth_encoding: params.booth_encoding,
      zero_count: params.zero_count,
    }
  }
}

impl Architecture for Laconic {
  fn name(&self) -> &'static str {
    "Laconic"
  }

  fn filename(&self) -> String {
    format!(
      "_R{}_C{}{}",
      self.state.rows,
      self.state.columns,
      if self.booth_encoding { "_booth" } else { "" }
    )
  }

  fn header(&self) -> String {
    let mut header = format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns);
    if self.booth_encoding {
      header += "Booth-like Encoding\n";
    }
    if self.zero_count {
      header += "Zero count as one cycle\n";
    }
    header
  }

  fn compute_bits(&self, act: u32, wgt: u32) -> u32 {
    let bit_multiplications = effectual_bits(act, self.booth_encoding) * effectual_bits(wgt, self.booth_encoding);
    if bit_multiplications == 0 && self.zero_count {
      1
    } else {
      bit_multiplications
    }
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.powers_of_two_representation(bits);
  }

  fn state(&self) -> &ArchState {
    &self.state
  }

  fn state_mut(&mut self) -> &mut ArchState {
    &mut self.state
  }

  fn step_cycles(&mut self, tiles: &[TileDescriptor], work: &TileWork) -> u64 {
    tiles
      .iter()
      .filter(|t| t.valid)
      .flat_map(|tile| work.operands(tile))
      .map(|op| effectual_bits(op.act, self.booth_encoding) * effectual_bits(op.wgt, self.booth_encoding))
      .max()
      .unwrap_or(0)
      .max(1) as u64
  }
}
