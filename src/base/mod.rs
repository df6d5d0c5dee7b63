pub mod layer;
pub mod network;
pub mod tensor;

pub use layer::{Layer, LayerKind, Precision};
pub use network::{DataType, Network, NetworkOverrides, Quantization};
pub use tensor::{Representation, Tensor, TensorView};
