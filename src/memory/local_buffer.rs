use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBufferConfig {
  #[serde(default = "default_rows")]
  pub rows: usize,
  #[serde(default = "default_delay")]
  pub read_delay: u64,
  #[serde(default = "default_delay")]
  pub write_delay: u64,
}

fn default_rows() -> usize {
  2
}

fn default_delay() -> u64 {
  1
}

impl Default for LocalBufferConfig {
  fn default() -> Self {
    Self {
      rows: default_rows(),
      read_delay: default_delay(),
      write_delay: default_delay(),
    }
  }
}

/// Circular FIFO of rows staged in front of the global buffer.
///
/// Every row tracks when its data arrives (`ready`) and when its previous
/// contents were consumed (`done`), which lets one row fill while another
/// is being read.
#[derive(Debug, Clone)]
pub struct LocalBuffer {
  rows: usize,
  read_delay: u64,
  write_delay: u64,
  idx: usize,
  ready_cycle: Vec<u64>,
  done_cycle: Vec<u64>,
}

impl LocalBuffer {
  pub fn new(rows: usize, read_delay: u64, write_delay: u64) -> Self {
    assert!(rows > 0, "local buffer needs at least one row");
    Self {
      rows,
      read_delay,
      write_delay,
      idx: 0,
      ready_cycle: vec![0; rows],
      done_cycle: vec![0; rows],
    }
  }

  pub fn from_config(config: &LocalBufferConfig) -> Self {
    Self::new(config.rows, config.read_delay, config.write_delay)
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn header(&self) -> String {
    let mut header = format!("Number of memory rows: {}\n", self.rows);
    if self.read_delay != 0 {
      header += &format!("Read delay: {}\n", self.read_delay);
    }
    if self.write_delay != 0 {
      header += &format!("Write delay: {}\n", self.write_delay);
    }
    header
  }

  pub fn configure_layer(&mut self) {
    self.idx = 0;
    self.ready_cycle.iter_mut().for_each(|c| *c = 0);
    self.done_cycle.iter_mut().for_each(|c| *c = 0);
  }

  pub fn fifo_ready_cycle(&self) -> u64 {
    self.ready_cycle[self.idx]
  }

  pub fn fifo_done_cycle(&self) -> u64 {
    self.done_cycle[self.idx]
  }

  pub fn update_fifo(&mut self) {
    self.idx = (self.idx + 1) % self.rows;
  }

  pub fn data_ready(&self, now: u64) -> bool {
    self.ready_cycle[self.idx] <= now
  }

  /// Stage the current row from a global buffer access completing at `global_ready_cycle`
  pub fn read_request(&mut self, global_ready_cycle: u64) {
    let row = &mut self.ready_cycle[self.idx];
    *row = (*row).max(global_ready_cycle + self.read_delay);
  }

  pub fn evict_data(&mut self, now: u64) {
    let row = &mut self.done_cycle[self.idx];
    *row = (*row).max(now);
  }

  pub fn write_ready(&self, now: u64) -> bool {
    self.done_cycle[self.idx] <= now
  }

  pub fn write_request(&mut self, now: u64) {
    let row = &mut self.ready_cycle[self.idx];
    *row = (*row).max(now + self.write_delay);
  }

  pub fn update_done_cycle(&mut self, global_ready_cycle: u64) {
    let row = &mut self.done_cycle[self.idx];
    *row = (*row).max(global_ready_cycle);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fifo_rotation() {
    let mut lb = LocalBuffer::new(2, 1, 0);
    lb.read_request(10);
    assert!(!lb.data_ready(10));
    assert!(lb.data_ready(11));
    lb.update_fifo();
    assert_eq!(lb.fifo_ready_cycle(), 0);
    lb.read_request(4);
    lb.update_fifo();
    assert_eq!(lb.fifo_ready_cycle(), 11);
  }

  #[test]
  fn test_cycles_never_move_backward() {
    let mut lb = LocalBuffer::new(1, 2, 3);
    lb.read_request(20);
    lb.read_request(5);
    assert_eq!(lb.fifo_ready_cycle(), 22);
    lb.update_done_cycle(30);
    lb.evict_data(12);
    assert_eq!(lb.fifo_done_cycle(), 30);
    assert!(!lb.write_ready(29));
    lb.configure_layer();
    assert_eq!(lb.fifo_ready_cycle(), 0);
  }
}
