use dnnsim::arch::{ArchKind, ArchParams};
use dnnsim::memory::{GlobalBufferConfig, LocalBufferConfig};
use dnnsim::scheduler::{SchedulerConfig, SearchShape};
use dnnsim::simulator::config::{AppConfig, Experiment, ExperimentSection, NetworkSection};
use dnnsim::simulator::engine::Engine;
use dnnsim::simulator::ppu::PpuConfig;
use dnnsim::simulator::sim::mode::{SimConfig, Task};
use dnnsim::simulator::simulator::run_experiment;
use dnnsim::simulator::tiling::{partition, steps, LayerWork};
use dnnsim::{Layer, LayerKind, Network, Simulator, Tensor, TensorView};
use std::fs;
use std::path::PathBuf;

fn experiment(arch: ArchKind, task: Task) -> Experiment {
  let params = ArchParams::default();
  Experiment {
    arch,
    task,
    scheduler: SchedulerConfig::new(params.lanes, 2, 5, SearchShape::T),
    params,
    memory: GlobalBufferConfig::default(),
    local: LocalBufferConfig::default(),
    ppu: PpuConfig::default(),
    dump_schedule: false,
  }
}

fn pattern(len: usize, modulo: i64, offset: i64) -> Vec<i64> {
  (0..len as i64).map(|i| (i * 7 + 3) % modulo - offset).collect()
}

/// 8x8x3 input, 3x3 kernel, stride 1, padding 1, 16 filters
fn conv_network() -> Network {
  let layer = Layer::new(LayerKind::Convolution, "conv1", 1, 1).with_tensors(
    Tensor::from_signed(vec![1, 3, 8, 8], &pattern(3 * 64, 11, 5), 16),
    Tensor::from_signed(vec![16, 3, 3, 3], &pattern(16 * 27, 5, 2), 16),
  );
  Network::new("conv", 16).with_layers(vec![layer])
}

fn mixed_network() -> Network {
  Network::new("mixed", 16).with_layers(vec![
    Layer::new(LayerKind::Convolution, "conv1", 2, 1).with_tensors(
      Tensor::from_signed(vec![3, 3, 10, 10], &pattern(3 * 3 * 100, 13, 6), 16),
      Tensor::from_signed(vec![20, 3, 3, 3], &pattern(20 * 27, 5, 2), 16),
    ),
    Layer::new(LayerKind::Pooling, "pool1", 2, 0)
      .with_tensors(Tensor::zeros(vec![3, 20, 5, 5], 16), Tensor::empty()),
    Layer::new(LayerKind::Convolution, "conv2", 1, 0).with_tensors(
      Tensor::from_signed(vec![3, 20, 5, 5], &pattern(3 * 20 * 25, 9, 0), 16),
      Tensor::from_signed(vec![24, 20, 3, 3], &pattern(24 * 20 * 9, 7, 3), 16),
    ),
    Layer::new(LayerKind::InnerProduct, "fc1", 1, 0).with_tensors(
      Tensor::from_signed(vec![3, 40], &pattern(3 * 40, 6, 1), 16),
      Tensor::from_signed(vec![36, 40], &pattern(36 * 40, 5, 2), 16),
    ),
    Layer::new(LayerKind::Lstm, "lstm1", 1, 0).with_tensors(
      Tensor::from_signed(vec![2, 3, 16], &pattern(2 * 3 * 16, 8, 4), 16),
      Tensor::from_signed(vec![20, 16], &pattern(20 * 16, 3, 1), 16),
    ),
  ])
}

fn sim(threads: usize) -> SimConfig {
  SimConfig {
    threads,
    fast_mode: false,
    quiet: true,
  }
}

#[test]
fn test_conv_output_and_descriptors() {
  let network = conv_network();
  let experiment = experiment(ArchKind::DaDianNao, Task::Cycles);
  let arch = experiment.arch.build(&experiment.params);
  let work = LayerWork::prepare(&network, 0, arch.as_ref()).unwrap();
  assert_eq!((work.out_x, work.out_y), (8, 8));

  let tiles = partition(&work, 16, 16, arch.multiplex_columns());
  assert_eq!(tiles.len(), 4);
  for tile in &tiles {
    assert!(tile.windows.len() * tile.filters.len() <= 16 * 16);
    assert!(tile.valid && !tile.write);
  }
  assert_eq!(steps(&work, &tiles, 16).len(), 9);
}

#[test]
fn test_descriptors_fit_the_array() {
  let network = mixed_network();
  for kind in ArchKind::ALL {
    let mut params = ArchParams::default();
    params.rows = 8;
    params.columns = 4;
    let arch = kind.build(&params);
    for index in [0, 2, 3, 4] {
      let work = LayerWork::prepare(&network, index, arch.as_ref()).unwrap();
      for tile in partition(&work, params.rows, params.columns, arch.multiplex_columns()) {
        assert!(tile.filters.len() <= params.rows, "{} layer {}", kind, work.name);
        assert!(tile.windows.len() <= params.columns, "{} layer {}", kind, work.name);
        assert!(tile.column < params.columns);
      }
    }
  }
}

#[test]
fn test_pe_accounting_covers_the_array() {
  let network = conv_network();
  for kind in [ArchKind::DaDianNao, ArchKind::Laconic, ArchKind::BitPragmatic] {
    let experiment = experiment(kind, Task::Cycles);
    let arch = experiment.arch.build(&experiment.params);
    let work = LayerWork::prepare(&network, 0, arch.as_ref()).unwrap();
    let timing = Engine::new(&experiment).run_layer(&work, 0);
    let pe = (experiment.params.rows * experiment.params.columns) as u64;
    assert_eq!(timing.scheduled_pe + timing.idle_pe, timing.steps * timing.descriptors * pe);
    assert!(timing.cycles >= timing.compute_cycles);
  }
}

#[test]
fn test_cycles_are_deterministic() {
  let network = mixed_network();
  for kind in ArchKind::ALL {
    let experiment = experiment(kind, Task::Cycles);
    let first = run_experiment(&network, &experiment, sim(1));
    let second = run_experiment(&network, &experiment, sim(1));
    let threaded = run_experiment(&network, &experiment, sim(3));
    assert_eq!(first.stats.layers().len(), 4, "{}", kind);
    assert_eq!(first.stats.totals(), second.stats.totals(), "{}", kind);
    assert_eq!(first.stats.totals(), threaded.stats.totals(), "{}", kind);
  }
}

#[test]
fn test_bit_serial_beats_baseline_work() {
  let network = mixed_network();
  let baseline = run_experiment(&network, &experiment(ArchKind::DaDianNao, Task::Potentials), sim(1));
  let pragmatic = run_experiment(&network, &experiment(ArchKind::BitPragmatic, Task::Potentials), sim(1));
  let bits = |report: &dnnsim::simulator::simulator::ExperimentReport| report.stats.totals()[0].1.unwrap();
  assert!(bits(&pragmatic) < bits(&baseline));
}

fn scratch_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("dnnsim-{}-{}", name, std::process::id()));
  fs::create_dir_all(&dir).unwrap();
  dir
}

const NETWORK_JSON: &str = r#"{
  "name": "tiny",
  "layers": [
    {
      "kind": "Convolution",
      "name": "conv1",
      "padding": 1,
      "activations": { "shape": [2, 2, 4, 4], "values": [
        1, 2, 0, 3, 4, 0, 5, 6, 7, 0, 8, 9, 1, 0, 2, 3,
        0, 1, 2, 0, 3, 4, 0, 5, 6, 7, 0, 8, 9, 1, 0, 2,
        3, 2, 1, 0, 1, 2, 3, 4, 0, 0, 1, 1, 2, 2, 3, 3,
        1, 1, 1, 1, 2, 0, 2, 0, 3, 3, 0, 0, 4, 0, 0, 4
      ] },
      "weights": { "shape": [4, 2, 3, 3], "values": [
        1, 0, -1, 2, 0, -2, 1, 0, -1, 0, 1, 0, 1, -4, 1, 0, 1, 0,
        0, 0, 3, 0, 0, 0, 3, 0, 0, 1, 1, 1, 0, 0, 0, -1, -1, -1,
        2, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 0, 5, 0, 0, 0, 0,
        1, 2, 1, 2, 4, 2, 1, 2, 1, -1, 0, 0, 0, 0, 0, 0, 0, 1
      ] }
    }
  ]
}"#;

#[test]
fn test_invalid_experiment_is_skipped() {
  let dir = scratch_dir("skip");
  let path = dir.join("tiny.json");
  fs::write(&path, NETWORK_JSON).unwrap();

  let mut bad = ExperimentSection::new("BitTacticalE");
  bad.search_shape = "X".to_string();
  let mut schedule = ExperimentSection::new("BitTacticalE");
  schedule.task = "Schedule".to_string();
  let config = AppConfig {
    networks: vec![NetworkSection::from_path(&path.to_string_lossy())],
    experiments: vec![bad, ExperimentSection::new("Stripes"), schedule],
    ..Default::default()
  };

  let reports = Simulator::new(config).run_experiments();
  fs::remove_dir_all(&dir).unwrap();
  assert_eq!(reports.len(), 2);
  assert_eq!(reports[0].arch, ArchKind::Stripes);
  assert_eq!(reports[0].stats.samples(), 2);
  assert_eq!(reports[1].task, Task::Schedule);
}

#[test]
fn test_missing_network_is_skipped() {
  let config = AppConfig {
    networks: vec![NetworkSection::from_path("/nonexistent/network.json")],
    experiments: vec![ExperimentSection::new("DaDianNao")],
    ..Default::default()
  };
  assert!(Simulator::new(config).run_experiments().is_empty());
}

#[test]
fn test_reports_are_written() {
  let dir = scratch_dir("reports");
  let path = dir.join("tiny.json");
  fs::write(&path, NETWORK_JSON).unwrap();

  let mut config = AppConfig {
    networks: vec![NetworkSection::from_path(&path.to_string_lossy())],
    experiments: vec![ExperimentSection::new("Laconic")],
    ..Default::default()
  };
  config.simulation.output_dir = dir.join("out").to_string_lossy().to_string();
  config.simulation.json = true;
  config.simulation.quiet = true;

  let reports = Simulator::new(config).run().unwrap();
  let csv = dir.join("out").join(format!("{}.csv", reports[0].filename));
  let json = dir.join("out").join(format!("{}.json", reports[0].filename));
  let text = fs::read_to_string(&csv).unwrap();
  let has_json = json.exists();
  fs::remove_dir_all(&dir).unwrap();

  assert!(text.starts_with("# Network: tiny"));
  assert!(text.contains("layer,cycles,"));
  assert!(text.contains("\nconv1,"));
  assert!(has_json);
}

#[test]
#[cfg(feature = "slow-tests")]
fn test_every_architecture_and_task() {
  let network = mixed_network();
  for kind in ArchKind::ALL {
    for task in Task::ALL {
      if task == Task::Schedule && !kind.is_tactical() {
        continue;
      }
      let report = run_experiment(&network, &experiment(kind, task), sim(2));
      assert!(report.stats.totals().iter().all(|(_, v)| v.is_some()), "{} {}", kind, task);
    }
  }
}

#[test]
fn test_tensor_view_of_prepared_layer() {
  let network = mixed_network();
  let arch = ArchKind::Stripes.build(&ArchParams::default());
  let lstm = LayerWork::prepare(&network, 4, arch.as_ref()).unwrap();
  assert_eq!(lstm.recursions, 2);
  assert_eq!(lstm.samples, 3);
  assert_eq!(lstm.act.shape(), &[6, 16, 1, 1]);
}
