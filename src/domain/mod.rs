//! Domain layer for the Polity consistency layer
//!
//! This module contains the graph value model, typed entities, identity
//! resolution outcomes and the ports the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{SyncError, SyncResult};
