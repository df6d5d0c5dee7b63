use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::bank::{BankArray, BankState};

/// Bits per addressable block
pub const BLOCK_SIZE: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalBufferConfig {
  /// Activation capacity in bytes, 0 for unbounded
  #[serde(default = "default_size")]
  pub act_size: u64,
  /// Weight capacity in bytes, 0 for unbounded
  #[serde(default = "default_size")]
  pub wgt_size: u64,
  #[serde(default = "default_banks")]
  pub act_banks: usize,
  #[serde(default = "default_banks")]
  pub wgt_banks: usize,
  #[serde(default = "default_banks")]
  pub out_banks: usize,
  /// Bank interface width in bits
  #[serde(default = "default_bank_width")]
  pub bank_width: u64,
  #[serde(default = "default_delay")]
  pub read_delay: u64,
  #[serde(default = "default_delay")]
  pub write_delay: u64,
}

fn default_size() -> u64 {
  4 * 1024 * 1024
}

fn default_banks() -> usize {
  16
}

fn default_bank_width() -> u64 {
  256
}

fn default_delay() -> u64 {
  2
}

impl Default for GlobalBufferConfig {
  fn default() -> Self {
    Self {
      act_size: default_size(),
      wgt_size: default_size(),
      act_banks: default_banks(),
      wgt_banks: default_banks(),
      out_banks: default_banks(),
      bank_width: default_bank_width(),
      read_delay: default_delay(),
      write_delay: default_delay(),
    }
  }
}

/// Contiguous bit address partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
  pub base: u64,
  /// Size in bits, 0 for unbounded
  pub size: u64,
}

impl AddressRange {
  pub fn new(base: u64, size: u64) -> Self {
    Self { base, size }
  }

  /// Offset of `address` inside the partition; on-chip capacity wraps around
  pub fn offset(&self, address: u64) -> u64 {
    if self.size == 0 {
      address
    } else {
      address % self.size
    }
  }

  pub fn end(&self) -> u64 {
    self.base + self.size
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalBufferStats {
  pub act_reads: u64,
  pub wgt_reads: u64,
  pub out_writes: u64,
  pub act_bank_conflicts: u64,
  pub wgt_bank_conflicts: u64,
  pub out_bank_conflicts: u64,
  pub stall_read_cycles: u64,
  pub stall_write_cycles: u64,
}

/// Banked on-chip buffer shared by every PE tile
#[derive(Debug, Clone)]
pub struct GlobalBuffer {
  config: GlobalBufferConfig,
  addrs_per_access: u64,
  act_range: AddressRange,
  wgt_range: AddressRange,
  out_range: AddressRange,
  act_banks: BankArray,
  wgt_banks: BankArray,
  out_banks: BankArray,
  act_read_ready_cycle: u64,
  wgt_read_ready_cycle: u64,
  write_ready_cycle: u64,
  stall_read_cycles: u64,
  stall_write_cycles: u64,
}

impl GlobalBuffer {
  pub fn new(config: GlobalBufferConfig) -> Self {
    assert!(config.bank_width > 0, "bank width must be positive");
    let addrs_per_access = config.bank_width.div_ceil(BLOCK_SIZE);
    let act_range = AddressRange::new(0, config.act_size * 8);
    let wgt_range = AddressRange::new(act_range.end(), config.wgt_size * 8);
    let out_range = AddressRange::new(wgt_range.end(), 0);
    Self {
      addrs_per_access,
      act_range,
      wgt_range,
      out_range,
      act_banks: BankArray::new(config.act_banks),
      wgt_banks: BankArray::new(config.wgt_banks),
      out_banks: BankArray::new(config.out_banks),
      act_read_ready_cycle: 0,
      wgt_read_ready_cycle: 0,
      write_ready_cycle: 0,
      stall_read_cycles: 0,
      stall_write_cycles: 0,
      config,
    }
  }

  pub fn config(&self) -> &GlobalBufferConfig {
    &self.config
  }

  pub fn addrs_per_access(&self) -> u64 {
    self.addrs_per_access
  }

  pub fn filename(&self) -> String {
    format!("_GBA{}_GBW{}", self.config.act_size, self.config.wgt_size)
  }

  pub fn header(&self) -> String {
    let mut header = String::new();
    header += &format!("Activation memory size: {}\n", self.config.act_size);
    header += &format!("Weight memory size: {}\n", self.config.wgt_size);
    header += &format!("Activation banks: {}\n", self.config.act_banks);
    header += &format!("Weight banks: {}\n", self.config.wgt_banks);
    header += &format!("Output banks: {}\n", self.config.out_banks);
    header += &format!("Bank interface width: {}\n", self.config.bank_width);
    header += &format!("Read delay: {}\n", self.config.read_delay);
    header += &format!("Write delay: {}\n", self.config.write_delay);
    header
  }

  /// Reset bank state and counters for a new layer
  pub fn configure_layer(&mut self) {
    self.act_banks.reset();
    self.wgt_banks.reset();
    self.out_banks.reset();
    self.act_read_ready_cycle = 0;
    self.wgt_read_ready_cycle = 0;
    self.write_ready_cycle = 0;
    self.stall_read_cycles = 0;
    self.stall_write_cycles = 0;
  }

  pub fn act_read_request(&mut self, addresses: &[u64], now: u64) -> u64 {
    let ready = access(
      &mut self.act_banks,
      &self.act_range,
      addresses,
      now,
      self.config.read_delay,
      self.addrs_per_access,
    );
    self.act_read_ready_cycle = self.act_read_ready_cycle.max(ready);
    ready
  }

  pub fn wgt_read_request(&mut self, addresses: &[u64], now: u64) -> u64 {
    let ready = access(
      &mut self.wgt_banks,
      &self.wgt_range,
      addresses,
      now,
      self.config.read_delay,
      self.addrs_per_access,
    );
    self.wgt_read_ready_cycle = self.wgt_read_ready_cycle.max(ready);
    ready
  }

  pub fn write_request(&mut self, addresses: &[u64], now: u64) -> u64 {
    let ready = access(
      &mut self.out_banks,
      &self.out_range,
      addresses,
      now,
      self.config.write_delay,
      self.addrs_per_access,
    );
    self.write_ready_cycle = self.write_ready_cycle.max(ready);
    ready
  }

  pub fn act_data_ready(&self, now: u64) -> bool {
    self.act_read_ready_cycle <= now
  }

  pub fn wgt_data_ready(&self, now: u64) -> bool {
    self.wgt_read_ready_cycle <= now
  }

  pub fn write_done(&self, now: u64) -> bool {
    self.write_ready_cycle <= now
  }

  pub fn act_ready_cycle(&self) -> u64 {
    self.act_read_ready_cycle
  }

  pub fn wgt_ready_cycle(&self) -> u64 {
    self.wgt_read_ready_cycle
  }

  pub fn write_ready_cycle(&self) -> u64 {
    self.write_ready_cycle
  }

  pub fn act_bank_state(&self, bank: usize, now: u64) -> BankState {
    self.act_banks.state(bank, now)
  }

  /// Drop pending accesses of the evicted partitions
  pub fn evict_data(&mut self, evict_act: bool, evict_wgt: bool) {
    if evict_act {
      self.act_banks.release();
      self.act_read_ready_cycle = 0;
    }
    if evict_wgt {
      self.wgt_banks.release();
      self.wgt_read_ready_cycle = 0;
    }
  }

  pub fn add_read_stall(&mut self, cycles: u64) {
    self.stall_read_cycles += cycles;
  }

  pub fn add_write_stall(&mut self, cycles: u64) {
    self.stall_write_cycles += cycles;
  }

  pub fn stats(&self) -> GlobalBufferStats {
    GlobalBufferStats {
      act_reads: self.act_banks.accesses(),
      wgt_reads: self.wgt_banks.accesses(),
      out_writes: self.out_banks.accesses(),
      act_bank_conflicts: self.act_banks.conflicts(),
      wgt_bank_conflicts: self.wgt_banks.conflicts(),
      out_bank_conflicts: self.out_banks.conflicts(),
      stall_read_cycles: self.stall_read_cycles,
      stall_write_cycles: self.stall_write_cycles,
    }
  }
}

/// One bank access per distinct line; lines interleave across banks.
/// Returns the cycle the slowest touched bank completes, `now` when idle.
fn access(
  banks: &mut BankArray,
  range: &AddressRange,
  addresses: &[u64],
  now: u64,
  delay: u64,
  addrs_per_access: u64,
) -> u64 {
  let line_bits = BLOCK_SIZE * addrs_per_access;
  let lines: BTreeSet<u64> = addresses.iter().map(|&a| range.offset(a) / line_bits).collect();
  let count = banks.banks() as u64;
  lines
    .into_iter()
    .map(|line| banks.request((line % count) as usize, now, delay))
    .fold(now, u64::max)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn buffer(read_delay: u64) -> GlobalBuffer {
    GlobalBuffer::new(GlobalBufferConfig {
      act_banks: 4,
      read_delay,
      ..GlobalBufferConfig::default()
    })
  }

  #[test]
  fn test_addrs_per_access() {
    assert_eq!(buffer(1).addrs_per_access(), 4);
    let narrow = GlobalBuffer::new(GlobalBufferConfig {
      bank_width: 100,
      ..GlobalBufferConfig::default()
    });
    assert_eq!(narrow.addrs_per_access(), 2);
  }

  #[test]
  fn test_queued_read_conflict() {
    let mut gb = buffer(10);
    // 256-bit lines over 4 banks, line 0 and line 4 share bank 0
    assert_eq!(gb.act_read_request(&[0], 0), 10);
    assert!(!gb.act_data_ready(5));
    assert_eq!(gb.act_read_request(&[4 * 256], 5), 20);
    assert_eq!(gb.stats().act_bank_conflicts, 1);
    assert_eq!(gb.stats().act_reads, 2);
    assert!(gb.act_data_ready(20));
  }

  #[test]
  fn test_same_line_is_one_access() {
    let mut gb = buffer(3);
    let ready = gb.act_read_request(&[0, 16, 64, 255], 0);
    assert_eq!(ready, 3);
    assert_eq!(gb.stats().act_reads, 1);
    assert_eq!(gb.stats().act_bank_conflicts, 0);
  }

  #[test]
  fn test_evict_and_configure() {
    let mut gb = buffer(10);
    gb.wgt_read_request(&[0], 0);
    gb.write_request(&[0, 256], 0);
    assert!(!gb.write_done(1));
    gb.evict_data(false, true);
    assert!(gb.wgt_data_ready(0));
    assert_eq!(gb.stats().wgt_reads, 1);
    gb.configure_layer();
    assert!(gb.write_done(0));
    assert_eq!(gb.stats(), GlobalBufferStats::default());
  }
}
