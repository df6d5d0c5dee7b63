use serde::{Deserialize, Serialize};

use super::tensor::{Tensor, TensorView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
  Convolution,
  InnerProduct,
  #[serde(alias = "LSTM")]
  Lstm,
  Pooling,
  #[serde(alias = "Relu")]
  ReLU,
}

impl LayerKind {
  /// Layers that carry weights and are timed by the engine
  pub fn is_compute(&self) -> bool {
    matches!(self, LayerKind::Convolution | LayerKind::InnerProduct | LayerKind::Lstm)
  }

  pub fn is_linear(&self) -> bool {
    matches!(self, LayerKind::InnerProduct | LayerKind::Lstm)
  }
}

/// Fixed-point precision of one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
  pub bits: u8,
  pub magnitude: u8,
  pub fraction: u8,
}

impl Default for Precision {
  fn default() -> Self {
    Self {
      bits: 16,
      magnitude: 8,
      fraction: 8,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Layer {
  pub kind: LayerKind,
  pub name: String,
  pub stride: usize,
  pub padding: usize,
  pub act_precision: Precision,
  pub wgt_precision: Precision,
  activations: Tensor,
  weights: Tensor,
}

impl Layer {
  pub fn new(kind: LayerKind, name: impl Into<String>, stride: usize, padding: usize) -> Self {
    Self {
      kind,
      name: name.into(),
      stride,
      padding,
      act_precision: Precision::default(),
      wgt_precision: Precision::default(),
      activations: Tensor::empty(),
      weights: Tensor::empty(),
    }
  }

  pub fn with_precisions(mut self, act: Precision, wgt: Precision) -> Self {
    self.act_precision = act;
    self.wgt_precision = wgt;
    self
  }

  pub fn with_tensors(mut self, activations: Tensor, weights: Tensor) -> Self {
    self.activations = activations;
    self.weights = weights;
    self
  }

  pub fn activations(&self) -> &Tensor {
    &self.activations
  }

  pub fn weights(&self) -> &Tensor {
    &self.weights
  }

  pub fn set_activations(&mut self, activations: Tensor) {
    self.activations = activations;
  }

  pub fn set_weights(&mut self, weights: Tensor) {
    self.weights = weights;
  }

  pub fn activations_mut(&mut self) -> &mut Tensor {
    &mut self.activations
  }

  pub fn weights_mut(&mut self) -> &mut Tensor {
    &mut self.weights
  }

  /// Kernel extent, 1x1 for linear layers
  pub fn kernel(&self) -> (usize, usize) {
    let shape = self.weights.shape();
    if shape.len() == 4 {
      (shape[2], shape[3])
    } else {
      (1, 1)
    }
  }

  /// Number of samples carried by the activation tensor
  pub fn samples(&self) -> usize {
    let shape = self.activations.shape();
    match self.kind {
      LayerKind::Lstm if shape.len() >= 2 => shape[1],
      _ => shape.first().copied().unwrap_or(0),
    }
  }
}
