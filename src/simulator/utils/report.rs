use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::log::is_log_enabled;
use crate::error::Result;
use crate::simulator::simulator::ExperimentReport;

/// Print the totals of every series
pub fn print_report(report: &ExperimentReport) {
  if !is_log_enabled() {
    return;
  }
  println!("\n--- {} on {} ({}) ---", report.arch, report.network, report.task);
  for (name, total) in report.stats.totals() {
    let total = total.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string());
    println!("  {:<28} {}", name, total);
  }
  println!("--- End Report ---\n");
}

/// Write the CSV report, plus JSON statistics and schedules when requested.
/// Returns the CSV path.
pub fn write_report(report: &ExperimentReport, dir: &Path, json: bool) -> Result<PathBuf> {
  fs::create_dir_all(dir)?;

  let csv_path = dir.join(format!("{}.csv", report.filename));
  let mut writer = BufWriter::new(File::create(&csv_path)?);
  report.stats.dump_csv(&mut writer, &report.header)?;
  writer.flush()?;

  if json {
    let json_path = dir.join(format!("{}.json", report.filename));
    let mut writer = BufWriter::new(File::create(&json_path)?);
    report.stats.dump_json(&mut writer)?;
    writer.flush()?;
  }

  if !report.schedules.is_empty() {
    let schedule_path = dir.join(format!("{}_schedule.json", report.filename));
    let mut writer = BufWriter::new(File::create(&schedule_path)?);
    serde_json::to_writer(&mut writer, &report.schedules)?;
    writer.flush()?;
  }

  info!("results written to {:?}", csv_path);
  Ok(csv_path)
}
