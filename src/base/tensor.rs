use serde::{Deserialize, Serialize};

/// Numeric encoding of the words stored in a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
  /// Plain two's complement fixed point
  TwosComplement { bits: u8 },
  /// Magnitude in the low `bits - 1` bits, sign at bit `bits - 1`
  SignMagnitude { bits: u8 },
  /// Magnitude only, every set bit is one power-of-two term
  PowersOfTwo { bits: u8 },
}

impl Representation {
  pub fn bits(&self) -> u8 {
    match *self {
      Representation::TwosComplement { bits } => bits,
      Representation::SignMagnitude { bits } => bits,
      Representation::PowersOfTwo { bits } => bits,
    }
  }

  /// Decode one word into its signed value
  pub fn decode(&self, word: u32) -> i64 {
    match *self {
      Representation::TwosComplement { bits } => {
        let word = (word as u64) & mask(bits);
        if bits > 0 && word & (1u64 << (bits - 1)) != 0 {
          word as i64 - (1i64 << bits)
        } else {
          word as i64
        }
      },
      Representation::SignMagnitude { bits } => {
        let sign_bit = 1u64 << (bits.max(1) - 1);
        let word = word as u64;
        let magnitude = (word & (sign_bit - 1)) as i64;
        if word & sign_bit != 0 {
          -magnitude
        } else {
          magnitude
        }
      },
      Representation::PowersOfTwo { bits } => ((word as u64) & mask(bits)) as i64,
    }
  }

  /// Encode a signed value, saturating to the representable range
  pub fn encode(&self, value: i64) -> u32 {
    match *self {
      Representation::TwosComplement { bits } => {
        let max = (1i64 << (bits - 1)) - 1;
        let min = -(1i64 << (bits - 1));
        ((value.clamp(min, max) as u64) & mask(bits)) as u32
      },
      Representation::SignMagnitude { bits } => {
        let sign_bit = 1u64 << (bits - 1);
        let magnitude = value.unsigned_abs().min(sign_bit - 1);
        if value < 0 && magnitude != 0 {
          (magnitude | sign_bit) as u32
        } else {
          magnitude as u32
        }
      },
      Representation::PowersOfTwo { bits } => value.unsigned_abs().min(mask(bits)) as u32,
    }
  }

  /// Mask selecting the magnitude bits of a word
  pub fn magnitude_mask(&self) -> u32 {
    match *self {
      Representation::SignMagnitude { bits } => mask(bits - 1) as u32,
      Representation::TwosComplement { bits } | Representation::PowersOfTwo { bits } => mask(bits) as u32,
    }
  }
}

fn mask(bits: u8) -> u64 {
  if bits >= 64 {
    u64::MAX
  } else {
    (1u64 << bits) - 1
  }
}

/// Read-only tensor contract consumed by the simulation core
pub trait TensorView {
  fn shape(&self) -> &[usize];

  fn get(&self, index: &[usize]) -> u32;

  fn dimensions(&self) -> usize {
    self.shape().len()
  }
}

/// Dense row-major container of fixed-point words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
  shape: Vec<usize>,
  data: Vec<u32>,
  repr: Representation,
}

impl Default for Tensor {
  fn default() -> Self {
    Self::empty()
  }
}

impl Tensor {
  pub fn empty() -> Self {
    Self {
      shape: Vec::new(),
      data: Vec::new(),
      repr: Representation::TwosComplement { bits: 16 },
    }
  }

  pub fn zeros(shape: Vec<usize>, bits: u8) -> Self {
    let len = shape.iter().product();
    Self {
      shape,
      data: vec![0; len],
      repr: Representation::TwosComplement { bits },
    }
  }

  /// Build a two's complement tensor from signed fixed-point values
  pub fn from_signed(shape: Vec<usize>, values: &[i64], bits: u8) -> Self {
    assert_eq!(
      shape.iter().product::<usize>(),
      values.len(),
      "tensor shape {:?} does not match {} values",
      shape,
      values.len()
    );
    let repr = Representation::TwosComplement { bits };
    Self {
      shape,
      data: values.iter().map(|&v| repr.encode(v)).collect(),
      repr,
    }
  }

  /// Quantize floating point values with a profiled integer/fraction split
  pub fn profiled_fixed_point(shape: Vec<usize>, values: &[f32], magnitude: u8, fraction: u8, bits: u8) -> Self {
    let scale = (1u64 << fraction) as f64;
    let limit = ((1i64 << (magnitude as u32 + fraction as u32).min(62)) - 1).max(0);
    let fixed: Vec<i64> = values
      .iter()
      .map(|&v| ((v as f64) * scale).round() as i64)
      .map(|v| v.clamp(-limit, limit))
      .collect();
    Self::from_signed(shape, &fixed, bits)
  }

  /// Asymmetric 8-bit quantization over the tensor range
  pub fn tensorflow_fixed_point(shape: Vec<usize>, values: &[f32]) -> Self {
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min).min(0.0);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max).max(0.0);
    let step = if max > min { (max - min) / 255.0 } else { 1.0 };
    let fixed: Vec<i64> = values.iter().map(|&v| ((v - min) / step).round() as i64 - 128).collect();
    Self::from_signed(shape, &fixed, 8)
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn representation(&self) -> Representation {
    self.repr
  }

  pub fn words(&self) -> &[u32] {
    &self.data
  }

  fn offset(&self, index: &[usize]) -> usize {
    assert_eq!(index.len(), self.shape.len(), "index rank mismatch for shape {:?}", self.shape);
    let mut offset = 0;
    for (i, (&idx, &extent)) in index.iter().zip(self.shape.iter()).enumerate() {
      assert!(idx < extent, "index {} out of range in dimension {} of {:?}", idx, i, self.shape);
      offset = offset * extent + idx;
    }
    offset
  }

  pub fn get4(&self, n: usize, c: usize, x: usize, y: usize) -> u32 {
    let s = &self.shape;
    self.data[((n * s[1] + c) * s[2] + x) * s[3] + y]
  }

  pub fn get2(&self, i: usize, j: usize) -> u32 {
    self.data[i * self.shape[1] + j]
  }

  /// Signed value at a multi-index
  pub fn value(&self, index: &[usize]) -> i64 {
    self.repr.decode(self.data[self.offset(index)])
  }

  /// Reinterpret the row-major data under a new shape of equal size
  pub fn reshape(&mut self, shape: Vec<usize>) {
    assert_eq!(
      shape.iter().product::<usize>(),
      self.data.len(),
      "cannot reshape {:?} into {:?}",
      self.shape,
      shape
    );
    self.shape = shape;
  }

  /// Flatten `[N, C, X, Y]` into `[N, C * X * Y]`
  pub fn reshape_to_2d(&mut self) {
    if self.shape.len() <= 2 {
      return;
    }
    let n = self.shape[0];
    let rest = self.shape[1..].iter().product();
    self.shape = vec![n, rest];
  }

  /// Extend `[N, C]` to `[N, C, 1, 1]`
  pub fn reshape_to_4d(&mut self) {
    while self.shape.len() < 4 {
      self.shape.push(1);
    }
  }

  /// Zero pad both spatial dimensions of a 4D tensor
  pub fn zero_pad(&mut self, padding: usize) {
    if padding == 0 || self.shape.len() != 4 {
      return;
    }
    let [n, c, x, y] = [self.shape[0], self.shape[1], self.shape[2], self.shape[3]];
    let (px, py) = (x + 2 * padding, y + 2 * padding);
    let zero = self.repr.encode(0);
    let mut data = vec![zero; n * c * px * py];
    for ni in 0..n {
      for ci in 0..c {
        for xi in 0..x {
          let src = ((ni * c + ci) * x + xi) * y;
          let dst = ((ni * c + ci) * px + xi + padding) * py + padding;
          data[dst..dst + y].copy_from_slice(&self.data[src..src + y]);
        }
      }
    }
    self.shape = vec![n, c, px, py];
    self.data = data;
  }

  /// Zero pad the channel dimension up to `channels`
  pub fn channel_zero_pad(&mut self, channels: usize) {
    if self.shape.len() < 2 || self.shape[1] >= channels {
      return;
    }
    let n = self.shape[0];
    let c = self.shape[1];
    let inner: usize = self.shape[2..].iter().product();
    let zero = self.repr.encode(0);
    let mut data = vec![zero; n * channels * inner];
    for ni in 0..n {
      let src = ni * c * inner;
      let dst = ni * channels * inner;
      data[dst..dst + c * inner].copy_from_slice(&self.data[src..src + c * inner]);
    }
    self.shape[1] = channels;
    self.data = data;
  }

  /// Fold a spatial stride into channels: `[N, C, X, Y]` becomes
  /// `[N, C * s * s, ceil(X / s), ceil(Y / s)]`
  pub fn reshape_first_layer_act(&mut self, stride: usize) {
    self.fold_stride(stride);
  }

  /// Same fold as the activations so both tensors index identical channels
  pub fn reshape_first_layer_wgt(&mut self, stride: usize) {
    self.fold_stride(stride);
  }

  fn fold_stride(&mut self, stride: usize) {
    if stride <= 1 || self.shape.len() != 4 {
      return;
    }
    let [n, c, x, y] = [self.shape[0], self.shape[1], self.shape[2], self.shape[3]];
    let (nx, ny) = (x.div_ceil(stride), y.div_ceil(stride));
    let nc = c * stride * stride;
    let zero = self.repr.encode(0);
    let mut data = vec![zero; n * nc * nx * ny];
    for ni in 0..n {
      for ci in 0..c {
        for xi in 0..x {
          for yi in 0..y {
            let new_c = ((xi % stride) * stride + yi % stride) * c + ci;
            let dst = ((ni * nc + new_c) * nx + xi / stride) * ny + yi / stride;
            data[dst] = self.get4(ni, ci, xi, yi);
          }
        }
      }
    }
    self.shape = vec![n, nc, nx, ny];
    self.data = data;
  }

  /// Re-encode every word into `target`; a no-op when already there
  pub fn convert(&mut self, target: Representation) {
    if self.repr == target {
      return;
    }
    let source = self.repr;
    for word in self.data.iter_mut() {
      *word = target.encode(source.decode(*word));
    }
    self.repr = target;
  }

  pub fn sign_magnitude_representation(&mut self, bits: u8) {
    self.convert(Representation::SignMagnitude { bits });
  }

  pub fn powers_of_two_representation(&mut self, bits: u8) {
    self.convert(Representation::PowersOfTwo { bits });
  }

  pub fn twos_complement_representation(&mut self, bits: u8) {
    self.convert(Representation::TwosComplement { bits });
  }
}

impl TensorView for Tensor {
  fn shape(&self) -> &[usize] {
    &self.shape
  }

  fn get(&self, index: &[usize]) -> u32 {
    self.data[self.offset(index)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_pad() {
    let mut t = Tensor::from_signed(vec![1, 1, 2, 2], &[1, 2, 3, 4], 16);
    t.zero_pad(1);
    assert_eq!(t.shape(), &[1, 1, 4, 4]);
    assert_eq!(t.value(&[0, 0, 0, 0]), 0);
    assert_eq!(t.value(&[0, 0, 1, 1]), 1);
    assert_eq!(t.value(&[0, 0, 2, 2]), 4);
    assert_eq!(t.value(&[0, 0, 3, 3]), 0);
  }

  #[test]
  fn test_sign_magnitude() {
    let mut t = Tensor::from_signed(vec![4], &[-3, 5, 0, -1], 16);
    t.sign_magnitude_representation(16);
    assert_eq!(t.words(), &[0x8003, 5, 0, 0x8001]);
    assert_eq!(t.value(&[0]), -3);
  }

  #[test]
  fn test_conversion_idempotent() {
    let mut once = Tensor::from_signed(vec![2, 3], &[-7, 12, 0, 300, -32768, 1], 16);
    once.sign_magnitude_representation(12);
    let mut twice = once.clone();
    twice.sign_magnitude_representation(12);
    assert_eq!(once, twice);

    let mut pot = once.clone();
    pot.powers_of_two_representation(16);
    let snapshot = pot.clone();
    pot.powers_of_two_representation(16);
    assert_eq!(pot, snapshot);
  }

  #[test]
  fn test_first_layer_fold() {
    let values: Vec<i64> = (0..16).collect();
    let mut t = Tensor::from_signed(vec![1, 1, 4, 4], &values, 16);
    t.reshape_first_layer_act(2);
    assert_eq!(t.shape(), &[1, 4, 2, 2]);
    // (x=1, y=0) lands in channel (1 * 2 + 0) at (0, 0)
    assert_eq!(t.value(&[0, 2, 0, 0]), 4);
    assert_eq!(t.value(&[0, 3, 1, 1]), 15);
  }

  #[test]
  fn test_reshape_and_channel_pad() {
    let mut t = Tensor::from_signed(vec![2, 3], &[1, 2, 3, 4, 5, 6], 16);
    t.reshape_to_4d();
    assert_eq!(t.shape(), &[2, 3, 1, 1]);
    t.channel_zero_pad(4);
    assert_eq!(t.shape(), &[2, 4, 1, 1]);
    assert_eq!(t.value(&[1, 0, 0, 0]), 4);
    assert_eq!(t.value(&[1, 3, 0, 0]), 0);
  }
}
