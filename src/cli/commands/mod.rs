//! Command handlers. Each builds a [`Runtime`](crate::infrastructure::setup::Runtime)
//! from the effective configuration and prints a [`CommandOutput`](super::output::CommandOutput).

pub mod config;
pub mod context;
pub mod identity;
pub mod watch;
