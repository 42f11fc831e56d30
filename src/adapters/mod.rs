//! Adapters implementing the domain ports.

pub mod cache;
pub mod hints;
pub mod memory;
