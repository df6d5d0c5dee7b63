pub mod bank;
pub mod global_buffer;
pub mod local_buffer;

pub use bank::{BankArray, BankState};
pub use global_buffer::{AddressRange, GlobalBuffer, GlobalBufferConfig, GlobalBufferStats, BLOCK_SIZE};
pub use local_buffer::{LocalBuffer, LocalBufferConfig};
