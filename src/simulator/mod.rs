pub mod config;
pub mod engine;
pub mod potentials;
pub mod ppu;
pub mod sim;
pub mod simulator;
pub mod tiling;
pub mod utils;

pub use simulator::Simulator;
pub use utils::log;
