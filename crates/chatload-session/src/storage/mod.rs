//! Session log stores.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::MemoryLogStore;

#[cfg(feature = "file")]
pub use file::JsonFileStore;
