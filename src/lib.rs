pub mod arch;
pub mod base;
pub mod error;
pub mod memory;
pub mod scheduler;
pub mod simulator;

pub use arch::{ArchKind, Architecture};
pub use base::{Layer, LayerKind, Network, Tensor, TensorView};
pub use error::{Result, SimError};
pub use simulator::utils::log;
pub use simulator::Simulator;
