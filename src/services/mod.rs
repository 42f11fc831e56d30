pub mod bounded_read;
pub mod game_context;
pub mod identity_resolver;
pub mod reference_resolver;
pub mod retry;
pub mod subscription_manager;

pub use bounded_read::BoundedReadCoordinator;
pub use game_context::GameContextService;
pub use identity_resolver::IdentityResolver;
pub use reference_resolver::{Freshness, ReferenceResolver};
pub use retry::RetryPolicy;
pub use subscription_manager::{Subscription, SubscriptionManager, SubscriptionScope};
