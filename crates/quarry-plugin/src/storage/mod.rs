//! Built-in storage plugins
//!
//! - **memory**: in-process map, used in tests and embedded setups
//! - **file**: local filesystem under a base path

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::{MemoryStorage, StorageCounts};
