use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
  /// Cycle-level timing simulation
  Cycles,
  /// Bit multiplications against the bit-parallel baseline
  Potentials,
  /// Weight scheduling statistics only
  Schedule,
}

impl Task {
  pub const ALL: [Task; 3] = [Task::Cycles, Task::Potentials, Task::Schedule];
}

impl fmt::Display for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self)
  }
}

impl FromStr for Task {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Task::ALL
      .iter()
      .copied()
      .find(|task| task.to_string().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown task {:?}, expected <Cycles|Potentials|Schedule>", s))
  }
}

/// Runtime flags shared by every experiment of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
  pub threads: usize,
  pub fast_mode: bool,
  pub quiet: bool,
}

impl Default for SimConfig {
  fn default() -> Self {
    Self {
      threads: 1,
      fast_mode: false,
      quiet: false,
    }
  }
}
