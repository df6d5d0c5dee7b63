use std::collections::BTreeSet;

use log::debug;

use crate::arch::{Architecture, LayerContext};
use crate::base::{Layer, LayerKind, Network, Precision, Tensor, TensorView};
use crate::error::{Result, SimError};
use crate::scheduler::{Schedule, WeightIndex};

/// One window group by one filter group placed on a PE tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDescriptor {
  /// Output window coordinates, one per column
  pub windows: Vec<(usize, usize)>,
  /// Filter indices, one per row
  pub filters: Vec<usize>,
  /// Some PE of the tile has effectual work at the current step
  pub valid: bool,
  /// Outputs are complete once the tile retires the current step
  pub write: bool,
  /// Completed outputs pass through the post-processing unit
  pub ppu: bool,
  /// Column occupied when linear layers multiplex columns
  pub column: usize,
}

/// One time step of a descriptor batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// Kernel position and first weight channel of a lane chunk
  Dense { kx: usize, ky: usize, channel: usize },
  /// Time step of the dense weight schedule
  Scheduled { time: usize },
}

/// A compute layer with its tensors laid out for tiling
#[derive(Debug, Clone)]
pub struct LayerWork {
  pub index: usize,
  pub name: String,
  pub kind: LayerKind,
  /// `[S, C, X, Y]`, padded; LSTM stores recursion-major `S = R * N`
  pub act: Tensor,
  /// `[K, Cw, Kx, Ky]`
  pub wgt: Tensor,
  pub stride: usize,
  pub out_x: usize,
  pub out_y: usize,
  pub samples: usize,
  pub recursions: usize,
  pub groups: usize,
  pub network_bits: u8,
  pub act_precision: Precision,
  pub wgt_precision: Precision,
  pub schedule: Option<Schedule>,
}

impl LayerWork {
  /// Pad, reshape and convert a layer for the given architecture
  pub fn prepare(network: &Network, index: usize, arch: &dyn Architecture) -> Result<LayerWork> {
    let layer = &network.layers()[index];
    let geometry = |reason: String| SimError::geometry(&network.name, &layer.name, reason);
    if !layer.kind.is_compute() {
      return Err(geometry(format!("{:?} layers are not timed", layer.kind)));
    }
    if layer.stride == 0 {
      return Err(geometry("stride must be positive".to_string()));
    }

    let mut act = layer.activations().clone();
    let mut wgt = layer.weights().clone();
    let mut stride = layer.stride;
    let mut recursions = 1;
    let samples;

    match layer.kind {
      LayerKind::Convolution => {
        if act.dimensions() != 4 {
          return Err(geometry(format!("convolution activations must be 4D, found {:?}", act.shape())));
        }
        match wgt.dimensions() {
          2 => wgt.reshape_to_4d(),
          4 => {},
          _ => return Err(geometry(format!("convolution weights must be 4D, found {:?}", wgt.shape()))),
        }
        samples = act.shape()[0];
        act.zero_pad(layer.padding);
        if act.shape()[1] == 3 && stride > 1 {
          act.reshape_first_layer_act(stride);
          wgt.reshape_first_layer_wgt(stride);
          stride = 1;
        }
      },
      LayerKind::InnerProduct => {
        if !matches!(act.dimensions(), 2 | 4) || !matches!(wgt.dimensions(), 2 | 4) {
          return Err(geometry(format!(
            "inner product expects 2D or 4D tensors, found {:?} and {:?}",
            act.shape(),
            wgt.shape()
          )));
        }
        samples = act.shape()[0];
        act.reshape_to_2d();
        act.reshape_to_4d();
        wgt.reshape_to_2d();
        wgt.reshape_to_4d();
      },
      LayerKind::Lstm => {
        match act.dimensions() {
          3 => {
            let [r, n, c] = [act.shape()[0], act.shape()[1], act.shape()[2]];
            act.reshape(vec![r * n, c, 1, 1]);
            recursions = r;
            samples = n;
          },
          2 => {
            samples = act.shape()[0];
            act.reshape_to_4d();
          },
          _ => return Err(geometry(format!("LSTM activations must be 2D or 3D, found {:?}", act.shape()))),
        }
        if wgt.dimensions() != 2 {
          return Err(geometry(format!("LSTM weights must be 2D, found {:?}", wgt.shape())));
        }
        wgt.reshape_to_4d();
      },
      LayerKind::Pooling | LayerKind::ReLU => unreachable!("checked by is_compute"),
    }

    let (x, y, act_channels) = (act.shape()[2], act.shape()[3], act.shape()[1]);
    let (filters, wgt_channels, kx, ky) = (wgt.shape()[0], wgt.shape()[1], wgt.shape()[2], wgt.shape()[3]);
    if wgt_channels == 0 || act_channels % wgt_channels != 0 {
      return Err(geometry(format!(
        "activation channels {} are not a multiple of weight channels {}",
        act_channels, wgt_channels
      )));
    }
    let groups = act_channels / wgt_channels;
    if layer.kind.is_linear() && groups != 1 {
      return Err(geometry(format!(
        "activation channels {} do not match weight channels {}",
        act_channels, wgt_channels
      )));
    }
    if filters % groups != 0 {
      return Err(geometry(format!("{} filters cannot be split in {} groups", filters, groups)));
    }
    if kx > x || ky > y {
      return Err(geometry(format!("kernel {}x{} is larger than the padded input {}x{}", kx, ky, x, y)));
    }

    let out_x = (x - kx) / stride + 1;
    let out_y = (y - ky) / stride + 1;

    arch.convert_representation(&mut act, network.network_bits);
    arch.convert_representation(&mut wgt, network.network_bits);

    debug!(
      "prepared layer {}: act {:?} wgt {:?} out {}x{} groups {}",
      layer.name,
      act.shape(),
      wgt.shape(),
      out_x,
      out_y,
      groups
    );

    Ok(LayerWork {
      index,
      name: layer.name.clone(),
      kind: layer.kind,
      act,
      wgt,
      stride,
      out_x,
      out_y,
      samples,
      recursions,
      groups,
      network_bits: network.network_bits,
      act_precision: layer.act_precision,
      wgt_precision: layer.wgt_precision,
      schedule: None,
    })
  }

  pub fn with_schedule(mut self, schedule: Schedule) -> Self {
    self.schedule = Some(schedule);
    self
  }

  pub fn is_linear(&self) -> bool {
    self.kind.is_linear()
  }

  pub fn num_filters(&self) -> usize {
    self.wgt.shape()[0]
  }

  pub fn act_channels(&self) -> usize {
    self.act.shape()[1]
  }

  pub fn wgt_channels(&self) -> usize {
    self.wgt.shape()[1]
  }

  pub fn kernel(&self) -> (usize, usize) {
    (self.wgt.shape()[2], self.wgt.shape()[3])
  }

  pub fn num_windows(&self) -> usize {
    self.out_x * self.out_y
  }

  /// First activation channel read by `filter`
  pub fn group_offset(&self, filter: usize) -> usize {
    (filter / (self.num_filters() / self.groups)) * self.wgt_channels()
  }

  pub fn context(&self) -> LayerContext {
    LayerContext {
      act_precision: self.act_precision,
      wgt_precision: self.wgt_precision,
      network_bits: self.network_bits,
      linear: self.is_linear(),
    }
  }

  /// Activation tensor row of `sample` in recursion `recursion`
  pub fn act_index(&self, recursion: usize, sample: usize) -> usize {
    recursion * self.samples + sample
  }

  /// Output windows in row-major order; linear layers have a single window
  pub fn windows(&self) -> Vec<(usize, usize)> {
    (0..self.out_x).flat_map(|x| (0..self.out_y).map(move |y| (x, y))).collect()
  }
}

/// Split the layer output space into descriptors of at most `rows` filters and
/// `columns` windows, window group major and filter group minor.
pub fn partition(work: &LayerWork, rows: usize, columns: usize, multiplex_columns: bool) -> Vec<TileDescriptor> {
  let filters: Vec<usize> = (0..work.num_filters()).collect();
  let windows = work.windows();
  let mut tiles = Vec::new();

  if work.is_linear() && multiplex_columns {
    for (group, chunk) in filters.chunks(rows).enumerate() {
      tiles.push(TileDescriptor {
        windows: vec![(0, 0)],
        filters: chunk.to_vec(),
        valid: true,
        write: false,
        ppu: false,
        column: group % columns,
      });
    }
    return tiles;
  }

  for window_group in windows.chunks(columns) {
    for filter_group in filters.chunks(rows) {
      tiles.push(TileDescriptor {
        windows: window_group.to_vec(),
        filters: filter_group.to_vec(),
        valid: true,
        write: false,
        ppu: false,
        column: 0,
      });
    }
  }
  tiles
}

impl TileDescriptor {
  /// Filters of the tile as a contiguous range
  pub fn filter_range(&self) -> std::ops::Range<usize> {
    match (self.filters.first(), self.filters.last()) {
      (Some(&first), Some(&last)) => first..last + 1,
      _ => 0..0,
    }
  }
}

/// Flag the tiles of `batch` that have work at `step` and those whose
/// outputs retire with it.
pub fn mark_step(work: &LayerWork, batch: &mut [TileDescriptor], step: Step, last: bool) {
  for tile in batch.iter_mut() {
    tile.valid = match (step, &work.schedule) {
      (Step::Scheduled { time }, Some(schedule)) => !schedule.is_step_empty(tile.filter_range(), time),
      _ => true,
    };
    tile.write = last;
    tile.ppu = last;
  }
}

/// Steps one descriptor batch runs through, skipping scheduled steps with no work
pub fn steps(work: &LayerWork, batch: &[TileDescriptor], lanes: usize) -> Vec<Step> {
  if let Some(schedule) = &work.schedule {
    return (0..schedule.time_steps())
      .filter(|&time| {
        batch
          .iter()
          .any(|tile| tile.filters.iter().any(|&f| !schedule.is_step_empty(f..f + 1, time)))
      })
      .map(|time| Step::Scheduled { time })
      .collect();
  }
  dense_steps(work, lanes)
}

/// Every kernel position and lane chunk of the weight channels
pub fn dense_steps(work: &LayerWork, lanes: usize) -> Vec<Step> {
  let (kx, ky) = work.kernel();
  let channels = work.wgt_channels();
  let mut steps = Vec::with_capacity(kx * ky * channels.div_ceil(lanes));
  for i in 0..kx {
    for j in 0..ky {
      for channel in (0..channels).step_by(lanes) {
        steps.push(Step::Dense { kx: i, ky: j, channel });
      }
    }
  }
  steps
}

/// One lane of one PE at a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
  /// Index into the tile's windows
  pub window: usize,
  pub filter: usize,
  pub lane: usize,
  pub act: u32,
  pub wgt: u32,
}

/// Data a descriptor batch consumes at one step of one sample
#[derive(Debug, Clone, Copy)]
pub struct TileWork<'a> {
  pub layer: &'a LayerWork,
  pub act_index: usize,
  pub step: Step,
  pub lanes: usize,
}

impl<'a> TileWork<'a> {
  pub fn new(layer: &'a LayerWork, act_index: usize, step: Step, lanes: usize) -> Self {
    Self {
      layer,
      act_index,
      step,
      lanes,
    }
  }

  /// Weight coordinate held by `lane` of `filter` at this step
  pub fn weight_index(&self, filter: usize, lane: usize) -> Option<WeightIndex> {
    match self.step {
      Step::Dense { kx, ky, channel } => {
        let channel = channel + lane;
        (channel < self.layer.wgt_channels()).then(|| WeightIndex::new(channel, kx, ky))
      },
      Step::Scheduled { time } => self.layer.schedule.as_ref().and_then(|s| s.slot(filter, lane, time)),
    }
  }

  fn act_word(&self, window: (usize, usize), filter: usize, index: WeightIndex) -> u32 {
    let layer = self.layer;
    layer.act.get4(
      self.act_index,
      layer.group_offset(filter) + index.channel,
      window.0 * layer.stride + index.kx,
      window.1 * layer.stride + index.ky,
    )
  }

  /// Every effectual lane of every PE in `tile`
  pub fn operands(&self, tile: &TileDescriptor) -> Vec<Operand> {
    let mut operands = Vec::with_capacity(tile.windows.len() * tile.filters.len() * self.lanes);
    for (w, &window) in tile.windows.iter().enumerate() {
      for &filter in &tile.filters {
        for lane in 0..self.lanes {
          if let Some(index) = self.weight_index(filter, lane) {
            operands.push(Operand {
              window: w,
              filter,
              lane,
              act: self.act_word(window, filter, index),
              wgt: self.layer.wgt.get4(filter, index.channel, index.kx, index.ky),
            });
          }
        }
      }
    }
    operands
  }

  /// Activations streamed into each column of `tile`, indexed by window
  pub fn column_activations(&self, tile: &TileDescriptor) -> Vec<Vec<u32>> {
    let dense = matches!(self.step, Step::Dense { .. });
    tile
      .windows
      .iter()
      .map(|&window| {
        // dense steps feed the same activations to every row
        let filters = if dense { &tile.filters[..tile.filters.len().min(1)] } else { &tile.filters[..] };
        filters
          .iter()
          .flat_map(|&filter| {
            (0..self.lanes).filter_map(move |lane| self.weight_index(filter, lane).map(|index| (filter, index)))
          })
          .map(|(filter, index)| self.act_word(window, filter, index))
          .collect()
      })
      .collect()
  }

  /// Bit addresses of the activations read by the batch, channel innermost
  pub fn act_addresses(&self, batch: &[TileDescriptor]) -> Vec<u64> {
    let layer = self.layer;
    let bits = layer.network_bits as u64;
    let shape = layer.act.shape();
    let (x_extent, y_extent, channels) = (shape[2], shape[3], shape[1]);
    let mut words = BTreeSet::new();
    for tile in batch.iter().filter(|t| t.valid) {
      // promoted lanes hold weights of other kernel positions
      let indices: BTreeSet<(usize, usize, usize)> = tile
        .filters
        .iter()
        .flat_map(|&filter| {
          (0..self.lanes).filter_map(move |lane| {
            self
              .weight_index(filter, lane)
              .map(|index| (layer.group_offset(filter) + index.channel, index.kx, index.ky))
          })
        })
        .collect();
      for &(wx, wy) in &tile.windows {
        for &(channel, kx, ky) in &indices {
          let x = wx * layer.stride + kx;
          let y = wy * layer.stride + ky;
          words.insert(((self.act_index * x_extent + x) * y_extent + y) * channels + channel);
        }
      }
    }
    words.into_iter().map(|word| word as u64 * bits).collect()
  }

  /// Bit addresses of the weights read by the batch
  pub fn wgt_addresses(&self, batch: &[TileDescriptor]) -> Vec<u64> {
    let layer = self.layer;
    let bits = layer.network_bits as u64;
    let (kx_extent, ky_extent) = layer.kernel();
    let channels = layer.wgt_channels();
    let mut addresses = Vec::new();
    for tile in batch.iter().filter(|t| t.valid) {
      for &filter in &tile.filters {
        let word = match self.step {
          Step::Dense { kx, ky, channel } => ((filter * kx_extent + kx) * ky_extent + ky) * channels + channel,
          Step::Scheduled { time } => {
            let steps = layer.schedule.as_ref().map_or(0, |s| s.time_steps());
            (filter * steps + time) * self.lanes
          },
        };
        addresses.push(word as u64 * bits);
      }
    }
    addresses
  }

  /// Bit addresses of the outputs written by the batch
  pub fn out_addresses(&self, batch: &[TileDescriptor]) -> Vec<u64> {
    let layer = self.layer;
    let bits = layer.network_bits as u64;
    let filters = layer.num_filters();
    let mut addresses = Vec::new();
    for tile in batch.iter().filter(|t| t.write) {
      for &(ox, oy) in &tile.windows {
        for &filter in &tile.filters {
          let word = ((self.act_index * layer.out_x + ox) * layer.out_y + oy) * filters + filter;
          addresses.push(word as u64 * bits);
        }
      }
    }
    addresses
  }
}

/// Output extent of a convolution along one dimension
pub fn output_extent(input: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
  let padded = input + 2 * padding;
  if stride == 0 || kernel > padded {
    return None;
  }
  Some((padded - kernel) / stride + 1)
}

/// Compute layers of a network in dataflow order
pub fn compute_layers(network: &Network) -> impl Iterator<Item = (usize, &Layer)> {
  network.layers().iter().enumerate().filter(|(_, l)| l.kind.is_compute())
}
