//! Polity - consistency layer for governance games on a replicated graph store
//!
//! Polity sits between game views and an eventually-consistent graph store.
//! It resolves pointer-valued fields, bounds collection reads that never
//! signal completion, caches decoded entities, works out which actor the
//! current user plays in a game, and manages live subscriptions.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pointers, entities, resolution outcomes and ports
//! - **Adapters** (`adapters`): In-memory peer, moka entity cache, hint stores
//! - **Service Layer** (`services`): Resolution, bounded reads, identity, subscriptions
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging, wiring
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use polity::infrastructure::setup::Runtime;
//! use polity::infrastructure::config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Runtime::build(ConfigLoader::load()?).await?;
//!     let me = runtime.service.resolve_my_actor("g1", "u1").await?;
//!     println!("{me:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{SyncError, SyncResult};
pub use domain::models::{
    Actor, ActorResolution, Agreement, Card, Completeness, Config, Entity, EntityKind, Game,
    GameContext, GraphPointer, RepairOutcome, ResolutionOutcome, ResolutionSource,
    ResolutionState,
};
pub use domain::ports::{EntityCache, GraphStore, HintStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BoundedReadCoordinator, GameContextService, IdentityResolver, ReferenceResolver,
    SubscriptionManager,
};
