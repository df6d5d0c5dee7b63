use serde::{Deserialize, Serialize};

use crate::simulator::tiling::TileDescriptor;

/// Post-processing unit between the PE array and the output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuConfig {
  /// Outputs accepted per pass
  #[serde(default = "default_inputs")]
  pub inputs: usize,
  /// Cycles per pass
  #[serde(default = "default_delay")]
  pub delay: u64,
}

fn default_inputs() -> usize {
  16
}

fn default_delay() -> u64 {
  1
}

impl Default for PpuConfig {
  fn default() -> Self {
    Self {
      inputs: default_inputs(),
      delay: default_delay(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Ppu {
  config: PpuConfig,
}

impl Ppu {
  pub fn new(config: PpuConfig) -> Self {
    Self { config }
  }

  /// Cycles to post-process the outputs of the tiles flagged `ppu`
  pub fn delay(&self, tiles: &[TileDescriptor]) -> u64 {
    let outputs: usize = tiles.iter().filter(|t| t.ppu).map(|t| t.windows.len() * t.filters.len()).sum();
    outputs.div_ceil(self.config.inputs.max(1)) as u64 * self.config.delay
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tile(windows: usize, filters: usize, ppu: bool) -> TileDescriptor {
    TileDescriptor {
      windows: vec![(0, 0); windows],
      filters: (0..filters).collect(),
      valid: true,
      write: ppu,
      ppu,
      column: 0,
    }
  }

  #[test]
  fn test_delay_counts_flagged_outputs() {
    let ppu = Ppu::new(PpuConfig { inputs: 16, delay: 3 });
    assert_eq!(ppu.delay(&[tile(4, 4, true), tile(16, 16, false)]), 3);
    assert_eq!(ppu.delay(&[tile(4, 4, true), tile(1, 1, true)]), 6);
    assert_eq!(ppu.delay(&[tile(16, 16, false)]), 0);
  }
}
