use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::layer::{Layer, LayerKind, Precision};
use super::tensor::{Tensor, TensorView};
use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantization {
  #[default]
  Profiled,
  Tensorflow8b,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
  #[default]
  Fixed16,
  Float32,
}

#[derive(Debug, Clone)]
pub struct Network {
  pub name: String,
  pub network_bits: u8,
  pub quantization: Quantization,
  pub forward: bool,
  pub backward: bool,
  layers: Vec<Layer>,
}

impl Network {
  pub fn new(name: impl Into<String>, network_bits: u8) -> Self {
    Self {
      name: name.into(),
      network_bits,
      quantization: Quantization::Profiled,
      forward: false,
      backward: false,
      layers: Vec::new(),
    }
  }

  pub fn with_layers(mut self, layers: Vec<Layer>) -> Self {
    self.layers = layers;
    self
  }

  pub fn push(&mut self, layer: Layer) {
    self.layers.push(layer);
  }

  pub fn layers(&self) -> &[Layer] {
    &self.layers
  }

  pub fn num_layers(&self) -> usize {
    self.layers.len()
  }

  /// Largest sample count over all activation tensors.
  ///
  /// LSTM activations `[R, N, C]` keep samples on the second axis.
  pub fn batches(&self) -> usize {
    self
      .layers
      .iter()
      .map(|l| {
        let shape = l.activations().shape();
        match (l.kind, shape.len()) {
          (LayerKind::Lstm, 3) => shape[1],
          _ => shape.first().copied().unwrap_or(0),
        }
      })
      .max()
      .unwrap_or(0)
  }

  /// Load a network description with inline tensors from a JSON file
  pub fn load_json(path: &Path) -> Result<Self> {
    Self::load_json_with(path, &NetworkOverrides::default())
  }

  /// Load a network file, replacing the fields set in `overrides`
  pub fn load_json_with(path: &Path, overrides: &NetworkOverrides) -> Result<Self> {
    let content = fs::read_to_string(path)?;
    let mut file: NetworkFile = serde_json::from_str(&content)?;
    if let Some(name) = &overrides.name {
      file.name = name.clone();
    }
    if let Some(bits) = overrides.network_bits {
      file.network_bits = bits;
    }
    if let Some(quantization) = overrides.quantization {
      file.quantization = quantization;
    }
    if let Some(forward) = overrides.forward {
      file.forward = forward;
    }
    if let Some(backward) = overrides.backward {
      file.backward = backward;
    }
    let network = file.into_network()?;
    info!(
      "loaded network {} ({} layers, {} samples) from {:?}",
      network.name,
      network.num_layers(),
      network.batches(),
      path
    );
    Ok(network)
  }
}

/// Network settings taken from the run configuration instead of the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkOverrides {
  pub name: Option<String>,
  pub network_bits: Option<u8>,
  pub quantization: Option<Quantization>,
  pub forward: Option<bool>,
  pub backward: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TensorFile {
  shape: Vec<usize>,
  values: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct LayerFile {
  kind: LayerKind,
  name: String,
  #[serde(default = "default_stride")]
  stride: usize,
  #[serde(default)]
  padding: usize,
  #[serde(default)]
  act_precision: Precision,
  #[serde(default)]
  wgt_precision: Precision,
  activations: TensorFile,
  #[serde(default)]
  weights: Option<TensorFile>,
}

fn default_stride() -> usize {
  1
}

fn default_network_bits() -> u8 {
  16
}

#[derive(Debug, Deserialize)]
struct NetworkFile {
  name: String,
  #[serde(default = "default_network_bits")]
  network_bits: u8,
  #[serde(default)]
  quantization: Quantization,
  #[serde(default)]
  data_type: DataType,
  #[serde(default)]
  forward: bool,
  #[serde(default)]
  backward: bool,
  layers: Vec<LayerFile>,
}

impl NetworkFile {
  fn into_network(mut self) -> Result<Network> {
    let bits = match self.quantization {
      Quantization::Tensorflow8b => 8,
      Quantization::Profiled => self.network_bits,
    };
    if !(2..=31).contains(&bits) {
      return Err(SimError::config(&self.name, "network_bits", format!("{} is outside 2..=31", bits)));
    }

    let mut network = Network::new(&self.name, bits);
    network.quantization = self.quantization;
    network.forward = self.forward;
    network.backward = self.backward;

    let layers = std::mem::take(&mut self.layers);
    for layer in layers {
      match self.build_layer(layer, bits) {
        Ok(layer) => network.push(layer),
        Err(e) => warn!("skipping layer: {}", e),
      }
    }
    Ok(network)
  }

  fn build_layer(&self, layer: LayerFile, bits: u8) -> Result<Layer> {
    let act = build_tensor(
      &self.name,
      &layer.name,
      layer.activations,
      self.data_type,
      self.quantization,
      layer.act_precision,
      bits,
    )?;
    let wgt = match layer.weights {
      Some(w) => build_tensor(
        &self.name,
        &layer.name,
        w,
        self.data_type,
        self.quantization,
        layer.wgt_precision,
        bits,
      )?,
      None => Tensor::empty(),
    };
    if layer.kind.is_compute() && wgt.is_empty() {
      return Err(SimError::geometry(&self.name, &layer.name, "compute layer without weights"));
    }
    debug!("layer {} act {:?} wgt {:?}", layer.name, act.shape(), wgt.shape());
    Ok(
      Layer::new(layer.kind, layer.name, layer.stride, layer.padding)
        .with_precisions(layer.act_precision, layer.wgt_precision)
        .with_tensors(act, wgt),
    )
  }
}

fn build_tensor(
  network: &str,
  layer: &str,
  file: TensorFile,
  data_type: DataType,
  quantization: Quantization,
  precision: Precision,
  bits: u8,
) -> Result<Tensor> {
  let expected: usize = file.shape.iter().product();
  if expected != file.values.len() {
    return Err(SimError::geometry(
      network,
      layer,
      format!("tensor shape {:?} needs {} values, found {}", file.shape, expected, file.values.len()),
    ));
  }
  if precision.magnitude as u32 + precision.fraction as u32 > 62 {
    return Err(SimError::config(
      network,
      "precision",
      format!(
        "layer {}: {} magnitude and {} fraction bits exceed 62",
        layer, precision.magnitude, precision.fraction
      ),
    ));
  }
  Ok(match (data_type, quantization) {
    (DataType::Fixed16, _) => {
      let fixed: Vec<i64> = file.values.iter().map(|v| v.round() as i64).collect();
      Tensor::from_signed(file.shape, &fixed, bits)
    },
    (DataType::Float32, Quantization::Tensorflow8b) => {
      let floats: Vec<f32> = file.values.iter().map(|&v| v as f32).collect();
      Tensor::tensorflow_fixed_point(file.shape, &floats)
    },
    (DataType::Float32, Quantization::Profiled) => {
      let floats: Vec<f32> = file.values.iter().map(|&v| v as f32).collect();
      Tensor::profiled_fixed_point(file.shape, &floats, precision.magnitude, precision.fraction, bits)
    },
  })
}
