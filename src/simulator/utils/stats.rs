use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

use crate::error::Result;

/// How a series folds samples into a layer value and layers into a total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Aggregation {
  /// Sum over samples and over layers
  Sum,
  /// Mean over samples and over layers
  Average,
  /// Mean over samples, summed over layers
  AverageTotal,
  /// Maximum over samples and over layers
  Max,
}

impl Aggregation {
  fn over_samples(&self, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
      return None;
    }
    Some(match self {
      Aggregation::Sum => values.iter().sum(),
      Aggregation::Average | Aggregation::AverageTotal => values.iter().sum::<f64>() / values.len() as f64,
      Aggregation::Max => values.iter().cloned().fold(f64::MIN, f64::max),
    })
  }

  fn over_layers(&self, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
      return None;
    }
    Some(match self {
      Aggregation::Sum | Aggregation::AverageTotal => values.iter().sum(),
      Aggregation::Average => values.iter().sum::<f64>() / values.len() as f64,
      Aggregation::Max => values.iter().cloned().fold(f64::MIN, f64::max),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesId(usize);

#[derive(Debug, Clone)]
struct Series {
  name: String,
  aggregation: Aggregation,
  /// `[layer][sample]`, `None` until written
  cells: Vec<Vec<Option<f64>>>,
}

impl Series {
  fn layer_value(&self, layer: usize) -> Option<f64> {
    let written: Vec<f64> = self.cells[layer].iter().flatten().copied().collect();
    self.aggregation.over_samples(&written)
  }

  fn total(&self) -> Option<f64> {
    let layers: Vec<f64> = (0..self.cells.len()).filter_map(|l| self.layer_value(l)).collect();
    self.aggregation.over_layers(&layers)
  }
}

/// Layer by sample table of named series, shared by worker threads
#[derive(Debug)]
pub struct Stats {
  layers: Vec<String>,
  samples: usize,
  series: Mutex<Vec<Series>>,
}

impl Stats {
  pub fn new(layers: Vec<String>, samples: usize) -> Self {
    Self {
      layers,
      samples,
      series: Mutex::new(Vec::new()),
    }
  }

  pub fn layers(&self) -> &[String] {
    &self.layers
  }

  pub fn samples(&self) -> usize {
    self.samples
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Series>> {
    // a worker that panicked leaves its own cells only
    self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn register(&self, name: &str, aggregation: Aggregation) -> SeriesId {
    let mut series = self.lock();
    if let Some(pos) = series.iter().position(|s| s.name == name) {
      return SeriesId(pos);
    }
    series.push(Series {
      name: name.to_string(),
      aggregation,
      cells: vec![vec![None; self.samples]; self.layers.len()],
    });
    SeriesId(series.len() - 1)
  }

  pub fn set(&self, id: SeriesId, layer: usize, sample: usize, value: f64) {
    self.lock()[id.0].cells[layer][sample] = Some(value);
  }

  pub fn add(&self, id: SeriesId, layer: usize, sample: usize, value: f64) {
    let mut series = self.lock();
    let cell = &mut series[id.0].cells[layer][sample];
    *cell = Some(cell.unwrap_or(0.0) + value);
  }

  pub fn value(&self, id: SeriesId, layer: usize, sample: usize) -> Option<f64> {
    self.lock()[id.0].cells[layer][sample]
  }

  pub fn layer_value(&self, id: SeriesId, layer: usize) -> Option<f64> {
    self.lock()[id.0].layer_value(layer)
  }

  pub fn total(&self, id: SeriesId) -> Option<f64> {
    self.lock()[id.0].total()
  }

  /// Name and total of every series in registration order
  pub fn totals(&self) -> Vec<(String, Option<f64>)> {
    self.lock().iter().map(|s| (s.name.clone(), s.total())).collect()
  }

  /// Free text header, then one row per layer and a total row
  pub fn dump_csv<W: Write>(&self, writer: &mut W, header: &str) -> Result<()> {
    let series = self.lock();
    for line in header.lines() {
      writeln!(writer, "# {}", line)?;
    }
    let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
    writeln!(writer, "layer,{}", names.join(","))?;
    for (l, layer) in self.layers.iter().enumerate() {
      let row: Vec<String> = series.iter().map(|s| format_cell(s.layer_value(l))).collect();
      writeln!(writer, "{},{}", layer, row.join(","))?;
    }
    let totals: Vec<String> = series.iter().map(|s| format_cell(s.total())).collect();
    writeln!(writer, "TOTAL,{}", totals.join(","))?;

    if self.samples > 1 {
      writeln!(writer)?;
      writeln!(writer, "layer,sample,{}", names.join(","))?;
      for (l, layer) in self.layers.iter().enumerate() {
        for sample in 0..self.samples {
          let row: Vec<String> = series.iter().map(|s| format_cell(s.cells[l][sample])).collect();
          writeln!(writer, "{},{},{}", layer, sample, row.join(","))?;
        }
      }
    }
    Ok(())
  }

  pub fn dump_json<W: Write>(&self, writer: &mut W) -> Result<()> {
    let series = self.lock();
    let dump = StatsDump {
      samples: self.samples,
      series: series
        .iter()
        .map(|s| SeriesDump {
          name: &s.name,
          aggregation: s.aggregation,
          total: s.total(),
          layers: self
            .layers
            .iter()
            .enumerate()
            .map(|(l, layer)| LayerDump {
              layer,
              value: s.layer_value(l),
              samples: &s.cells[l],
            })
            .collect(),
        })
        .collect(),
    };
    serde_json::to_writer_pretty(&mut *writer, &dump)?;
    writeln!(writer)?;
    Ok(())
  }
}

fn format_cell(value: Option<f64>) -> String {
  match value {
    Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
    Some(v) => format!("{:.4}", v),
    None => String::new(),
  }
}

#[derive(Serialize)]
struct StatsDump<'a> {
  samples: usize,
  series: Vec<SeriesDump<'a>>,
}

#[derive(Serialize)]
struct SeriesDump<'a> {
  name: &'a str,
  aggregation: Aggregation,
  total: Option<f64>,
  layers: Vec<LayerDump<'a>>,
}

#[derive(Serialize)]
struct LayerDump<'a> {
  layer: &'a str,
  value: Option<f64>,
  samples: &'a [Option<f64>],
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stats() -> Stats {
    Stats::new(vec!["conv1".to_string(), "fc1".to_string()], 2)
  }

  #[test]
  fn test_aggregations() {
    let stats = stats();
    let cycles = stats.register("cycles", Aggregation::AverageTotal);
    let peak = stats.register("peak", Aggregation::Max);
    let ratio = stats.register("ratio", Aggregation::Average);
    for (layer, values) in [[10.0, 20.0], [30.0, 50.0]].iter().enumerate() {
      for (sample, &v) in values.iter().enumerate() {
        stats.set(cycles, layer, sample, v);
        stats.set(peak, layer, sample, v);
        stats.set(ratio, layer, sample, v / 10.0);
      }
    }
    assert_eq!(stats.layer_value(cycles, 0), Some(15.0));
    assert_eq!(stats.total(cycles), Some(55.0));
    assert_eq!(stats.total(peak), Some(50.0));
    assert_eq!(stats.total(ratio), Some(2.75));
  }

  #[test]
  fn test_unwritten_cells_are_skipped() {
    let stats = stats();
    let sum = stats.register("reads", Aggregation::Sum);
    stats.add(sum, 1, 0, 4.0);
    stats.add(sum, 1, 0, 2.0);
    assert_eq!(stats.value(sum, 1, 0), Some(6.0));
    assert_eq!(stats.layer_value(sum, 0), None);
    assert_eq!(stats.total(sum), Some(6.0));
    assert_eq!(stats.register("reads", Aggregation::Sum), sum);
  }

  #[test]
  fn test_dump_csv() {
    let stats = Stats::new(vec!["conv1".to_string()], 1);
    let cycles = stats.register("cycles", Aggregation::AverageTotal);
    stats.set(cycles, 0, 0, 42.0);
    let mut out = Vec::new();
    stats.dump_csv(&mut out, "Stripes\nR16").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text, "# Stripes\n# R16\nlayer,cycles\nconv1,42\nTOTAL,42\n");
  }

  #[test]
  fn test_dump_json() {
    let stats = stats();
    let cycles = stats.register("cycles", Aggregation::Sum);
    stats.set(cycles, 0, 1, 3.0);
    let mut out = Vec::new();
    stats.dump_json(&mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["series"][0]["name"], "cycles");
    assert_eq!(value["series"][0]["total"], 3.0);
    assert!(value["series"][0]["layers"][1]["value"].is_null());
  }
}
