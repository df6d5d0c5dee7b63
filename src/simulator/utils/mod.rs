pub mod log;
pub mod report;
pub mod stats;
