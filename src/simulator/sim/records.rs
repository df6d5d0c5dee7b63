/// Macro to write one statistics cell of the current layer and sample
///
/// Usage:
/// ```ignore
/// stat_record!(stats, series.cycles, layer, sample, timing.cycles);
/// stat_record!(stats, series.bubbles, layer, 0, schedule.stats().bubbles);
/// ```
#[macro_export]
macro_rules! stat_record {
  ($stats:expr, $series:expr, $layer:expr, $sample:expr, $value:expr) => {
    $stats.set($series, $layer, $sample, $value as f64);
  };
}
