use super::{Schedule, ScheduleStats, ScheduledLane, WeightIndex};
use crate::base::{Tensor, TensorView};

/// Deal the weights of every filter round-robin over `lanes` queues.
///
/// Weights are visited kernel-x, kernel-y, then channel in chunks of `lanes`.
/// Zero weights become placeholders and every lane is padded so that all
/// filters share the same length.
pub fn naive_schedule(wgt: &Tensor, act_channels: usize, lanes: usize) -> Schedule {
  assert!(lanes > 0, "scheduler needs at least one lane");
  let shape = wgt.shape();
  let (num_filters, wgt_channels, kx, ky) = match shape.len() {
    4 => (shape[0], shape[1], shape[2], shape[3]),
    2 => (shape[0], shape[1], 1, 1),
    _ => (0, 0, 1, 1),
  };
  let groups = if wgt_channels > 0 { (act_channels / wgt_channels).max(1) } else { 1 };
  let per_group = (num_filters / groups).max(1);
  let repr = wgt.representation();

  let weights_per_filter = kx * ky * wgt_channels;
  let steps = weights_per_filter.div_ceil(lanes);

  let mut filters = Vec::with_capacity(num_filters);
  let mut group_offsets = Vec::with_capacity(num_filters);
  for m in 0..num_filters {
    let group_offset = (m / per_group) * wgt_channels;
    let mut lanes_of_filter: Vec<ScheduledLane> = vec![Vec::with_capacity(steps); lanes];
    let mut index = 0;
    for i in 0..kx {
      for j in 0..ky {
        for chunk in (0..wgt_channels).step_by(lanes) {
          for channel in chunk..(chunk + lanes).min(wgt_channels) {
            let word = if shape.len() == 4 {
              wgt.get4(m, channel, i, j)
            } else {
              wgt.get2(m, channel)
            };
            let slot = (repr.decode(word) != 0).then(|| WeightIndex::new(channel, i, j));
            lanes_of_filter[index % lanes].push(slot);
            index += 1;
          }
        }
      }
    }
    for lane in lanes_of_filter.iter_mut() {
      lane.resize(steps, None);
    }
    filters.push(lanes_of_filter);
    group_offsets.push(group_offset);
  }

  Schedule {
    lanes,
    max_time: vec![steps; num_filters],
    filters,
    group_offsets,
    promotions: Vec::new(),
    stats: ScheduleStats::default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_robin_order() {
    // one filter, 2 channels, 2x1 kernel: order is (kx0,c0) (kx0,c1) (kx1,c0) (kx1,c1)
    let wgt = Tensor::from_signed(vec![1, 2, 2, 1], &[1, 2, 3, 4], 16);
    let schedule = naive_schedule(&wgt, 2, 3);
    assert_eq!(schedule.time_steps(), 2);
    assert_eq!(schedule.slot(0, 0, 0), Some(WeightIndex::new(0, 0, 0)));
    assert_eq!(schedule.slot(0, 1, 0), Some(WeightIndex::new(1, 0, 0)));
    assert_eq!(schedule.slot(0, 2, 0), Some(WeightIndex::new(0, 1, 0)));
    assert_eq!(schedule.slot(0, 0, 1), Some(WeightIndex::new(1, 1, 0)));
    assert_eq!(schedule.slot(0, 1, 1), None);
    assert_eq!(schedule.slot(0, 2, 1), None);
  }

  #[test]
  fn test_grouped_offsets() {
    // 4 filters over 2 groups of 1 weight channel each
    let wgt = Tensor::from_signed(vec![4, 1, 1, 1], &[1, 1, 1, 1], 16);
    let schedule = naive_schedule(&wgt, 2, 4);
    assert_eq!(schedule.group_offset(0), 0);
    assert_eq!(schedule.group_offset(1), 0);
    assert_eq!(schedule.group_offset(2), 1);
    assert_eq!(schedule.group_offset(3), 1);
  }
}
