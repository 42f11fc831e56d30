pub mod collection;
pub mod config;
pub mod entity;
pub mod identity;
pub mod node;
pub mod pointer;

pub use collection::{CollectionRead, CollectionSummary, Completeness, GameContext};
pub use config::{
    BackoffSchedule, CacheConfig, Config, HintConfig, IdentityConfig, LoggingConfig, ReadConfig,
    RetryConfig, StoreConfig,
};
pub use entity::{
    entity_kind_of, Actor, Agreement, Card, Deck, Entity, EntityKind, Game, GameCollection, User,
};
pub use identity::{
    ActorResolution, IdentityMapping, RepairOutcome, ResolutionOutcome, ResolutionSource,
    ResolutionState,
};
pub use node::{InlinedNode, ResolvedField, ResolvedNode};
pub use pointer::{GraphPointer, GraphValue, RawNode, Scalar, POINTER_KEY};
