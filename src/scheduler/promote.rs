use log::{debug, trace};

use super::{Promotion, Schedule, ScheduledLane, SchedulerConfig, SearchShape};

/// Fill placeholders of a naive schedule by promoting effectual weights
pub fn promote(mut schedule: Schedule, config: &SchedulerConfig) -> Schedule {
  let mut promotions = Vec::new();
  for filter in 0..schedule.filters.len() {
    let max_time = schedule.max_time[filter];
    let lanes = &mut schedule.filters[filter];
    for time in 0..max_time {
      for lane in 0..lanes.len() {
        if lanes[lane][time].is_some() {
          continue;
        }
        let Some((src_lane, src_time)) = search(lanes, lane, time, max_time, config) else {
          continue;
        };
        lanes[lane][time] = lanes[src_lane][src_time].take();
        trace!("filter {} promote ({}, {}) -> ({}, {})", filter, src_lane, src_time, lane, time);
        promotions.push(Promotion {
          filter,
          from: (src_lane, src_time),
          to: (lane, time),
        });
      }
    }
  }

  let mut bubbles = 0;
  let mut effectual_steps = 0;
  for lanes in &schedule.filters {
    let steps = lanes.first().map_or(0, |l| l.len());
    for time in 0..steps {
      let busy = lanes.iter().filter(|l| l[time].is_some()).count();
      if busy > 0 {
        effectual_steps += 1;
        bubbles += lanes.len() - busy;
      }
    }
  }

  debug!(
    "scheduled {} filters: {} promotions, {} bubbles, {} effectual steps",
    schedule.filters.len(),
    promotions.len(),
    bubbles,
    effectual_steps
  );
  schedule.stats.promotions = promotions.len();
  schedule.stats.bubbles = bubbles;
  schedule.stats.effectual_steps = effectual_steps;
  schedule.promotions = promotions;
  schedule
}

/// First effectual candidate for the empty slot `(lane, time)`.
///
/// Look-ahead scans the same lane nearest future step first; look-aside
/// scans the following lanes at the same step nearest lane first.
fn search(
  lanes: &[ScheduledLane],
  lane: usize,
  time: usize,
  max_time: usize,
  config: &SchedulerConfig,
) -> Option<(usize, usize)> {
  for h in 1..=config.lookahead_h {
    let t = time + h;
    if t >= max_time {
      break;
    }
    if lanes[lane][t].is_some() {
      return Some((lane, t));
    }
  }

  if config.shape == SearchShape::T {
    for d in 1..=config.lookaside_d {
      let l = lane + d;
      if l >= lanes.len() {
        break;
      }
      if lanes[l][time].is_some() && has_refill(&lanes[l], time, max_time, config.lookahead_h) {
        return Some((l, time));
      }
    }
  }
  None
}

/// A neighbour only gives up its weight when its own look-ahead can refill the hole
fn has_refill(lane: &ScheduledLane, time: usize, max_time: usize, lookahead_h: usize) -> bool {
  (1..=lookahead_h).map(|h| time + h).take_while(|&t| t < max_time).any(|t| lane[t].is_some())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::base::Tensor;
  use crate::scheduler::naive::naive_schedule;
  use crate::scheduler::{schedule_layer, WeightIndex};

  fn l_shape(lanes: usize) -> SchedulerConfig {
    SchedulerConfig::new(lanes, 2, 0, SearchShape::L)
  }

  #[test]
  fn test_dense_filter_is_untouched() {
    let wgt = Tensor::from_signed(vec![1, 4, 1, 1], &[1, 2, 3, 4], 16);
    let naive = naive_schedule(&wgt, 4, 4);
    let schedule = schedule_layer(&wgt, 4, &l_shape(4));
    assert_eq!(schedule.stats().promotions, 0);
    assert_eq!(schedule.filter(0), naive.filter(0));
  }

  #[test]
  fn test_sparse_filter_keeps_bubbles_without_candidates() {
    let wgt = Tensor::from_signed(vec![1, 4, 1, 1], &[5, 0, 3, 0], 16);
    let schedule = schedule_layer(&wgt, 4, &l_shape(4));
    assert_eq!(schedule.stats().promotions, 0);
    assert_eq!(schedule.stats().bubbles, 2);
    assert_eq!(schedule.filter(0).len(), 4);
    assert!(schedule.filter(0).iter().all(|l| l.len() == 1));
  }

  #[test]
  fn test_single_lane_look_ahead() {
    let wgt = Tensor::from_signed(vec![1, 4, 1, 1], &[5, 0, 3, 0], 16);
    let schedule = schedule_layer(&wgt, 4, &l_shape(1));
    assert_eq!(schedule.stats().promotions, 1);
    assert_eq!(schedule.filter(0)[0].len(), 4);
    assert_eq!(schedule.slot(0, 0, 1), Some(WeightIndex::new(2, 0, 0)));
    assert_eq!(schedule.slot(0, 0, 2), None);
    assert_eq!(schedule.effectual_steps(0..1), 2);
  }

  #[test]
  fn test_look_aside_chain() {
    // lane 0: [0, 0], lane 1: [7, 9] with 2 lanes over 4 channels
    let wgt = Tensor::from_signed(vec![1, 4, 1, 1], &[0, 7, 0, 9], 16);
    let config = SchedulerConfig::new(2, 2, 5, SearchShape::T);
    let schedule = schedule_layer(&wgt, 4, &config);
    assert_eq!(schedule.slot(0, 0, 0), Some(WeightIndex::new(1, 0, 0)));
    assert_eq!(schedule.slot(0, 1, 0), Some(WeightIndex::new(3, 0, 0)));
    assert_eq!(schedule.effectual_steps(0..1), 1);
    assert_eq!(schedule.stats().dense_steps, 2);
  }
}
