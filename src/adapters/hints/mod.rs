//! Client-local identity hint stores.

pub mod file;
pub mod memory;

pub use file::FileHintStore;
pub use memory::InMemoryHintStore;
