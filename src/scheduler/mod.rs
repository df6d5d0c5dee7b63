//! Static weight scheduler for sparsity exploiting designs.
//!
//! Weights of every filter are first dealt round-robin into `lanes` queues
//! (the naive layout), then zero slots are refilled by promoting effectual
//! weights found inside a bounded look-ahead / look-aside window.

pub mod naive;
pub mod promote;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::base::Tensor;
use crate::error::{Result, SimError};

/// Coordinates of one weight inside its filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeightIndex {
  pub channel: usize,
  pub kx: usize,
  pub ky: usize,
}

impl WeightIndex {
  pub fn new(channel: usize, kx: usize, ky: usize) -> Self {
    Self { channel, kx, ky }
  }
}

/// One lane of a filter; `None` is an inert placeholder
pub type ScheduledLane = Vec<Option<WeightIndex>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchShape {
  /// Look-ahead only
  L,
  /// Look-ahead plus look-aside
  T,
}

impl SearchShape {
  /// Parse and validate a search shape against its window parameters
  pub fn parse(network: &str, shape: &str, lookahead_h: usize, lookaside_d: usize) -> Result<Self> {
    match shape.trim() {
      "L" | "l" => Ok(SearchShape::L),
      "T" | "t" => {
        if lookahead_h != 2 || lookaside_d != 5 {
          return Err(SimError::config(
            network,
            "search_shape",
            "T-shape search requires lookahead of 2 and lookaside of 5",
          ));
        }
        Ok(SearchShape::T)
      },
      other => Err(SimError::config(network, "search_shape", format!("must be <L|T>, found {:?}", other))),
    }
  }
}

impl fmt::Display for SearchShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SearchShape::L => write!(f, "L"),
      SearchShape::T => write!(f, "T"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
  pub lanes: usize,
  pub lookahead_h: usize,
  pub lookaside_d: usize,
  pub shape: SearchShape,
}

impl SchedulerConfig {
  pub fn new(lanes: usize, lookahead_h: usize, lookaside_d: usize, shape: SearchShape) -> Self {
    Self {
      lanes,
      lookahead_h,
      lookaside_d,
      shape,
    }
  }
}

/// A weight moved from `from` into an empty slot `to`, as (lane, time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Promotion {
  pub filter: usize,
  pub from: (usize, usize),
  pub to: (usize, usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
  /// Time steps per filter before promotion
  pub dense_steps: usize,
  pub promotions: usize,
  /// Empty slots left in steps that still carry work
  pub bubbles: usize,
  /// Steps of every filter that carry at least one weight
  pub effectual_steps: usize,
}

/// Dense lane-balanced schedule for every filter of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
  lanes: usize,
  filters: Vec<Vec<ScheduledLane>>,
  group_offsets: Vec<usize>,
  max_time: Vec<usize>,
  promotions: Vec<Promotion>,
  stats: ScheduleStats,
}

impl Schedule {
  pub fn num_filters(&self) -> usize {
    self.filters.len()
  }

  pub fn lanes(&self) -> usize {
    self.lanes
  }

  /// Length shared by every lane of every filter
  pub fn time_steps(&self) -> usize {
    self.filters.first().and_then(|f| f.first()).map_or(0, |l| l.len())
  }

  pub fn filter(&self, filter: usize) -> &[ScheduledLane] {
    &self.filters[filter]
  }

  pub fn slot(&self, filter: usize, lane: usize, time: usize) -> Option<WeightIndex> {
    self.filters[filter][lane][time]
  }

  /// First activation channel consumed by the filter's group
  pub fn group_offset(&self, filter: usize) -> usize {
    self.group_offsets[filter]
  }

  pub fn max_time(&self, filter: usize) -> usize {
    self.max_time[filter]
  }

  pub fn promotions(&self) -> &[Promotion] {
    &self.promotions
  }

  pub fn stats(&self) -> ScheduleStats {
    self.stats
  }

  /// True when every lane of every filter in `filters` is a placeholder at `time`
  pub fn is_step_empty(&self, filters: Range<usize>, time: usize) -> bool {
    filters
      .filter(|&f| f < self.filters.len())
      .all(|f| self.filters[f].iter().all(|lane| lane[time].is_none()))
  }

  /// Steps a group of filters must execute after skipping empty ones
  pub fn effectual_steps(&self, filters: Range<usize>) -> usize {
    (0..self.time_steps()).filter(|&t| !self.is_step_empty(filters.clone(), t)).count()
  }
}

/// Build the dense schedule of a 4D weight tensor `[K, C, Kx, Ky]`
pub fn schedule_layer(wgt: &Tensor, act_channels: usize, config: &SchedulerConfig) -> Schedule {
  let naive = naive::naive_schedule(wgt, act_channels, config.lanes);
  let dense_steps = naive.time_steps();
  let mut schedule = promote::promote(naive, config);
  schedule.stats.dense_steps = dense_steps;
  schedule
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_search_shape_parse() {
    assert_eq!(SearchShape::parse("net", "L", 2, 0).unwrap(), SearchShape::L);
    assert_eq!(SearchShape::parse("net", "T", 2, 5).unwrap(), SearchShape::T);
    assert!(matches!(SearchShape::parse("net", "T", 3, 5), Err(SimError::Config { .. })));
    assert!(matches!(SearchShape::parse("net", "X", 2, 5), Err(SimError::Config { .. })));
  }
}
