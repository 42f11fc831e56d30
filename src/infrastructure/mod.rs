//! Infrastructure layer module
//!
//! This module contains the process-level plumbing around the library:
//! - Configuration management
//! - Logging infrastructure
//! - Runtime wiring for the CLI

pub mod config;
pub mod logging;
pub mod setup;
