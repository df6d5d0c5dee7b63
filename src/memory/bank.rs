#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
  Idle,
  Busy { ready_at: u64 },
}

/// Ready cycles of a set of independently addressed banks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankArray {
  ready_cycle: Vec<u64>,
  accesses: u64,
  conflicts: u64,
}

impl BankArray {
  pub fn new(banks: usize) -> Self {
    assert!(banks > 0, "bank array needs at least one bank");
    Self {
      ready_cycle: vec![0; banks],
      accesses: 0,
      conflicts: 0,
    }
  }

  pub fn banks(&self) -> usize {
    self.ready_cycle.len()
  }

  /// Queue one access to `bank` at `now` and return the cycle it completes
  pub fn request(&mut self, bank: usize, now: u64, delay: u64) -> u64 {
    let ready = &mut self.ready_cycle[bank];
    if *ready > now {
      self.conflicts += 1;
    }
    *ready = (*ready).max(now) + delay;
    self.accesses += 1;
    *ready
  }

  pub fn ready_cycle(&self, bank: usize) -> u64 {
    self.ready_cycle[bank]
  }

  pub fn state(&self, bank: usize, now: u64) -> BankState {
    let ready_at = self.ready_cycle[bank];
    if ready_at > now {
      BankState::Busy { ready_at }
    } else {
      BankState::Idle
    }
  }

  /// Cycle at which every bank is idle again
  pub fn max_ready(&self) -> u64 {
    self.ready_cycle.iter().copied().max().unwrap_or(0)
  }

  pub fn accesses(&self) -> u64 {
    self.accesses
  }

  pub fn conflicts(&self) -> u64 {
    self.conflicts
  }

  /// Forget pending accesses, counters are kept
  pub fn release(&mut self) {
    self.ready_cycle.iter_mut().for_each(|c| *c = 0);
  }

  pub fn reset(&mut self) {
    self.release();
    self.accesses = 0;
    self.conflicts = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_back_to_back_requests_conflict() {
    let mut banks = BankArray::new(4);
    assert_eq!(banks.request(1, 0, 10), 10);
    assert_eq!(banks.state(1, 5), BankState::Busy { ready_at: 10 });
    assert_eq!(banks.request(1, 5, 10), 20);
    assert_eq!(banks.conflicts(), 1);
    assert_eq!(banks.state(1, 20), BankState::Idle);
    assert_eq!(banks.state(0, 0), BankState::Idle);
  }

  #[test]
  fn test_replay_is_deterministic() {
    let trace = [(0, 0), (1, 0), (0, 3), (2, 7), (0, 30), (1, 31)];
    let run = || {
      let mut banks = BankArray::new(3);
      let ready: Vec<u64> = trace.iter().map(|&(b, t)| banks.request(b, t, 4)).collect();
      (ready, banks)
    };
    let (first_ready, first) = run();
    let (second_ready, second) = run();
    assert_eq!(first_ready, second_ready);
    assert_eq!(first, second);
    assert_eq!(first.conflicts(), 1);
  }
}
