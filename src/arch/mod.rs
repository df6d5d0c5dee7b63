//! Accelerator cost models.
//!
//! Every policy supplies the per-step cycle cost of a descriptor batch and the
//! bit-level multiplications of one activation/weight pair; pipelining and PE
//! accounting are shared through [`ArchState`].

pub mod dadiannao;
pub mod dynamic_stripes;
pub mod laconic;
pub mod pragmatic;
pub mod state;
pub mod stripes;
pub mod tactical;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::base::{Precision, Tensor};
use crate::simulator::tiling::{TileDescriptor, TileWork};

pub use dadiannao::DaDianNao;
pub use dynamic_stripes::DynamicStripes;
pub use laconic::Laconic;
pub use pragmatic::BitPragmatic;
pub use state::{ArchState, ColumnSync};
pub use stripes::Stripes;
pub use tactical::{BitTacticalE, BitTacticalP};

/// Precisions of the layer currently simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerContext {
  pub act_precision: Precision,
  pub wgt_precision: Precision,
  pub network_bits: u8,
  pub linear: bool,
}

impl Default for LayerContext {
  fn default() -> Self {
    Self {
      act_precision: Precision::default(),
      wgt_precision: Precision::default(),
      network_bits: 16,
      linear: false,
    }
  }
}

/// Cycles returned by [`Architecture::process_tiles`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileTiming {
  /// The PE array accepts the next batch
  pub ready_cycle: u64,
  /// Results of this batch are complete
  pub done_cycle: u64,
}

/// Static parameters shared by every policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchParams {
  pub rows: usize,
  pub columns: usize,
  pub lanes: usize,
  pub tiles: usize,
  /// Activations sharing one dynamic precision decision
  pub precision_granularity: usize,
  /// Steps a column group may run ahead of the slowest one
  pub column_registers: usize,
  pub booth_encoding: bool,
  pub zero_count: bool,
  /// Dynamic precision keeps only the leading bit position
  pub leading_bit: bool,
}

impl Default for ArchParams {
  fn default() -> Self {
    Self {
      rows: 16,
      columns: 16,
      lanes: 16,
      tiles: 16,
      precision_granularity: 256,
      column_registers: 0,
      booth_encoding: false,
      zero_count: false,
      leading_bit: false,
    }
  }
}

pub trait Architecture: Send {
  fn name(&self) -> &'static str;

  /// Tag appended to report file names
  fn filename(&self) -> String;

  /// Free text describing the configuration
  fn header(&self) -> String;

  /// Bit multiplications of one pair of words in this policy's representation
  fn compute_bits(&self, act: u32, wgt: u32) -> u32;

  /// Re-encode a tensor into the representation this policy consumes
  fn convert_representation(&self, tensor: &mut Tensor, bits: u8);

  fn needs_scheduling(&self) -> bool {
    false
  }

  fn multiplex_columns(&self) -> bool {
    false
  }

  fn state(&self) -> &ArchState;

  fn state_mut(&mut self) -> &mut ArchState;

  /// Cycles the batch occupies the PE array at the step described by `work`
  fn step_cycles(&mut self, tiles: &[TileDescriptor], work: &TileWork) -> u64;

  fn configure_layer(&mut self, ctx: LayerContext) {
    let multiplex = self.multiplex_columns();
    self.state_mut().configure(ctx, multiplex);
  }

  fn process_tiles(&mut self, tiles: &[TileDescriptor], work: &TileWork, now: u64) -> TileTiming {
    let cycles = self.step_cycles(tiles, work);
    self.state_mut().advance(tiles, cycles, now)
  }

  fn cycles(&self) -> u64 {
    self.state().cycles()
  }

  fn scheduled_pe(&self) -> u64 {
    self.state().scheduled_pe()
  }

  fn idle_pe(&self) -> u64 {
    self.state().idle_pe()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchKind {
  DaDianNao,
  Stripes,
  DynamicStripes,
  BitPragmatic,
  Laconic,
  BitTacticalE,
  BitTacticalP,
}

impl ArchKind {
  pub const ALL: [ArchKind; 7] = [
    ArchKind::DaDianNao,
    ArchKind::Stripes,
    ArchKind::DynamicStripes,
    ArchKind::BitPragmatic,
    ArchKind::Laconic,
    ArchKind::BitTacticalE,
    ArchKind::BitTacticalP,
  ];

  pub fn build(&self, params: &ArchParams) -> Box<dyn Architecture> {
    match self {
      ArchKind::DaDianNao => Box::new(DaDianNao::new(params)),
      ArchKind::Stripes => Box::new(Stripes::new(params)),
      ArchKind::DynamicStripes => Box::new(DynamicStripes::new(params)),
      ArchKind::BitPragmatic => Box::new(BitPragmatic::new(params)),
      ArchKind::Laconic => Box::new(Laconic::new(params)),
      ArchKind::BitTacticalE => Box::new(BitTacticalE::new(params)),
      ArchKind::BitTacticalP => Box::new(BitTacticalP::new(params)),
    }
  }

  pub fn is_tactical(&self) -> bool {
    matches!(self, ArchKind::BitTacticalE | ArchKind::BitTacticalP)
  }

  /// Policies that group activations under one dynamic precision
  pub fn uses_precision_granularity(&self) -> bool {
    matches!(self, ArchKind::DynamicStripes | ArchKind::BitTacticalP)
  }
}

impl fmt::Display for ArchKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self)
  }
}

impl FromStr for ArchKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ArchKind::ALL
      .iter()
      .copied()
      .find(|kind| kind.to_string().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| {
        let names: Vec<String> = ArchKind::ALL.iter().map(|k| k.to_string()).collect();
        format!("unknown architecture {:?}, expected <{}>", s, names.join("|"))
      })
  }
}

/// Non-zero digits of the canonical signed-digit form of `value`
pub fn booth_terms(value: u32) -> u32 {
  let mut n = value as u64;
  let mut terms = 0;
  while n != 0 {
    if n & 1 == 1 {
      // digit is +1 when n = 1 (mod 4) and -1 when n = 3 (mod 4)
      if n & 2 == 0 {
        n -= 1;
      } else {
        n += 1;
      }
      terms += 1;
    }
    n >>= 1;
  }
  terms
}

/// Bits of `magnitude` that cost a serial cycle
pub fn effectual_bits(magnitude: u32, booth: bool) -> u32 {
  if booth {
    booth_terms(magnitude)
  } else {
    magnitude.count_ones()
  }
}

/// Bits needed to hold every magnitude of a group; 0 for an all-zero group
pub fn dynamic_precision(magnitudes: impl IntoIterator<Item = u32>, leading_bit: bool) -> u32 {
  let mut or = 0u32;
  let mut lowest = u32::MAX;
  for m in magnitudes {
    if m != 0 {
      or |= m;
      lowest = lowest.min(m.trailing_zeros());
    }
  }
  if or == 0 {
    return 0;
  }
  let msb = 31 - or.leading_zeros();
  if leading_bit {
    msb + 1
  } else {
    msb - lowest + 1
  }
}

/// Magnitude bits of a sign-magnitude word of `bits` width
pub fn sign_magnitude(word: u32, bits: u8) -> u32 {
  word & ((1u32 << (bits.clamp(1, 32) - 1)) - 1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_booth_terms() {
    assert_eq!(booth_terms(0), 0);
    assert_eq!(booth_terms(1), 1);
    assert_eq!(booth_terms(3), 2);
    // 7 = 8 - 1
    assert_eq!(booth_terms(7), 2);
    // 0b1111_0000 = 256 - 16
    assert_eq!(booth_terms(0xF0), 2);
    assert_eq!(booth_terms(0b1010_1010), 4);
  }

  #[test]
  fn test_dynamic_precision() {
    assert_eq!(dynamic_precision([0, 0], false), 0);
    assert_eq!(dynamic_precision([0b0100, 0b1000], false), 2);
    assert_eq!(dynamic_precision([0b0100, 0b1000], true), 4);
    assert_eq!(dynamic_precision([1], false), 1);
  }

  #[test]
  fn test_arch_kind_parse() {
    assert_eq!("stripes".parse::<ArchKind>().unwrap(), ArchKind::Stripes);
    assert_eq!("BitTacticalP".parse::<ArchKind>().unwrap(), ArchKind::BitTacticalP);
    assert!("SCNN".parse::<ArchKind>().is_err());
  }

  #[test]
  fn test_zero_count_cost() {
    let params = ArchParams {
      zero_count: true,
      ..ArchParams::default()
    };
    let laconic = ArchKind::Laconic.build(&params);
    assert_eq!(laconic.compute_bits(0, 5), 1);
    assert_eq!(laconic.compute_bits(3, 5), 4);
    let strict = ArchKind::Laconic.build(&ArchParams::default());
    assert_eq!(strict.compute_bits(0, 5), 0);
  }
}
