//! Resource cache, in-flight coalescing and subscriptions.
//!
//! - [`ResourceCache`]: bounded LRU of decoded resources keyed by absolute URL
//! - [`PendingRequests`]: at most one outbound fetch per URL
//! - [`SubscriptionBus`]: standing subscriptions and one-shot fetch waiters
//! - [`UpdateSet`]: hrefs to seed or re-validate after a mutation
//!
//! ## Configuration
//!
//! ```toml
//! [client]
//! max_size = 500
//! ```

mod bus;
mod config;
pub(crate) mod lock;
mod pending;
mod store;
mod update;

pub use bus::{Listener, Outcome, SubscriptionBus, SubscriptionId};
pub use config::CacheConfig;
pub use pending::{FetchMode, Join, PendingRequests, Seeded, Settlement};
pub use store::{Resource, ResourceCache};
pub use update::{MutationResult, Seed, Update, UpdateSet};

pub(crate) use store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
