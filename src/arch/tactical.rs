use super::{
  dynamic_precision, effectual_bits, sign_magnitude, ArchParams, ArchState, Architecture, ColumnSync, LayerContext,
};
use crate::base::Tensor;
use crate::simulator::tiling::{TileDescriptor, TileWork};

/// Front end shared by both BitTactical back ends: zero weights are removed
/// by the static scheduler and only scheduled steps reach the PE array
#[derive(Debug, Clone)]
struct TacticalCore {
  state: ArchState,
  lanes: usize,
  precision_granularity: usize,
  booth_encoding: bool,
  zero_count: bool,
  leading_bit: bool,
  sync: ColumnSync,
}

impl TacticalCore {
  fn new(params: &ArchParams) -> Self {
    Self {
      state: ArchState::new(params),
      lanes: params.lanes,
      precision_granularity: params.precision_granularity,
      booth_encoding: params.booth_encoding,
      zero_count: params.zero_count,
      leading_bit: params.leading_bit,
      sync: ColumnSync::new(params.column_registers),
    }
  }

  fn bits(&self) -> u8 {
    self.state.ctx.network_bits
  }

  fn header(&self) -> String {
    let mut header = format!("Number of rows: {}\nNumber of columns: {}\n", self.state.rows, self.state.columns);
    header += &format!("Number of weight lanes: {}\n", self.lanes);
    header += &format!("Number of registers per column: {}\n", self.sync.registers());
    header
  }

  /// Zero weights never reach a lane
  fn weighted(&self, wgt: u32, act_bits: u32) -> u32 {
    if sign_magnitude(wgt, self.bits()) == 0 {
      return 0;
    }
    let bit_multiplications = act_bits * self.bits() as u32;
    if bit_multiplications == 0 && self.zero_count {
      1
    } else {
      bit_multiplications
    }
  }
}

/// BitTactical with a Pragmatic back end
#[derive(Debug, Clone)]
pub struct BitTacticalE {
  core: TacticalCore,
}

impl BitTacticalE {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      core: TacticalCore::new(params),
    }
  }
}

impl Architecture for BitTacticalE {
  fn name(&self) -> &'static str {
    "BitTacticalE"
  }

  fn filename(&self) -> String {
    let core = &self.core;
    format!(
      "_R{}_C{}_L{}{}",
      core.state.rows,
      core.state.columns,
      core.lanes,
      if core.booth_encoding { "_booth" } else { "" }
    )
  }

  fn header(&self) -> String {
    let mut header = self.core.header();
    if self.core.booth_encoding {
      header += "Booth-like Encoding\n";
    }
    if self.core.zero_count {
      header += "Zero count as one cycle\n";
    }
    header
  }

  fn compute_bits(&self, act: u32, wgt: u32) -> u32 {
    let act_bits = effectual_bits(sign_magnitude(act, self.core.bits()), self.core.booth_encoding);
    self.core.weighted(wgt, act_bits)
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.sign_magnitude_representation(bits);
  }

  fn needs_scheduling(&self) -> bool {
    true
  }

  fn state(&self) -> &ArchState {
    &self.core.state
  }

  fn state_mut(&mut self) -> &mut ArchState {
    &mut self.core.state
  }

  fn step_cycles(&mut self, tiles: &[TileDescriptor], work: &TileWork) -> u64 {
    let bits = self.core.bits();
    let booth = self.core.booth_encoding;
    tiles
      .iter()
      .filter(|t| t.valid)
      .flat_map(|tile| work.operands(tile))
      .map(|op| effectual_bits(sign_magnitude(op.act, bits), booth))
      .max()
      .unwrap_or(0)
      .max(1) as u64
  }
}

/// BitTactical with a dynamic precision back end
#[derive(Debug, Clone)]
pub struct BitTacticalP {
  core: TacticalCore,
}

impl BitTacticalP {
  pub fn new(params: &ArchParams) -> Self {
    Self {
      core: TacticalCore::new(params),
    }
  }
}

impl Architecture for BitTacticalP {
  fn name(&self) -> &'static str {
    "BitTacticalP"
  }

  fn filename(&self) -> String {
    let core = &self.core;
    format!(
      "_R{}_C{}_L{}_PG{}{}",
      core.state.rows,
      core.state.columns,
      core.lanes,
      core.precision_granularity,
      if core.leading_bit { "_LB" } else { "" }
    )
  }

  fn header(&self) -> String {
    let mut header = self.core.header();
    header += &format!("Precision granularity: {}\n", self.core.precision_granularity);
    if self.core.leading_bit {
      header += "Only leading bit for dynamic precisions\n";
    }
    header
  }

  fn compute_bits(&self, act: u32, wgt: u32) -> u32 {
    let magnitude = sign_magnitude(act, self.core.bits());
    self.core.weighted(wgt, dynamic_precision([magnitude], self.core.leading_bit))
  }

  fn convert_representation(&self, tensor: &mut Tensor, bits: u8) {
    tensor.sign_magnitude_representation(bits);
  }

  fn needs_scheduling(&self) -> bool {
    true
  }

  fn state(&self) -> &ArchState {
    &self.core.state
  }

  fn state_mut(&mut self) -> &mut ArchState {
    &mut self.core.state
  }

  fn configure_layer(&mut self, ctx: LayerContext) {
    self.core.sync.reset();
    self.core.state.configure(ctx, false);
  }

  fn step_cycles(&mut self, tiles: &[TileDescriptor], work: &TileWork) -> u64 {
    let bits = self.core.bits();
    let group = (self.core.precision_granularity / self.core.lanes.max(1)).max(1);
    let mut costs = Vec::new();
    for tile in tiles.iter().filter(|t| t.valid) {
      let operands = work.operands(tile);
      for first in (0..tile.windows.len()).step_by(group) {
        let magnitudes = operands
          .iter()
          .filter(|op| op.window >= first && op.window < first + group)
          .map(|op| sign_magnitude(op.act, bits));
        costs.push(dynamic_precision(magnitudes, self.core.leading_bit).max(1) as u64);
      }
    }
    if costs.is_empty() {
      return 1;
    }
    self.core.sync.step(&costs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_weight_costs_nothing() {
    let params = ArchParams {
      zero_count: true,
      ..ArchParams::default()
    };
    let e = BitTacticalE::new(&params);
    let p = BitTacticalP::new(&params);
    assert_eq!(e.compute_bits(5, 0), 0);
    assert_eq!(p.compute_bits(5, 0), 0);
    assert_eq!(e.compute_bits(0, 3), 1);
    assert_eq!(e.compute_bits(5, 3), 2 * 16);
    assert_eq!(p.compute_bits(5, 3), 3 * 16);
    assert!(e.needs_scheduling() && p.needs_scheduling());
  }
}
