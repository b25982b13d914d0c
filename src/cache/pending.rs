//! In-flight fetch registry.
//!
//! At most one fetch per href is outbound at any instant. Joining, starting and
//! settling all happen under the href's map entry, and settlement writes the
//! cache and drains waiters before the entry disappears, so a caller arriving
//! late sees either the pending fetch or the fresh cache entry, never neither.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use super::bus::{Listener, Outcome, SubscriptionBus, SubscriptionId, deliver};
use super::store::{Resource, ResourceCache};

/// How a fetch treats caches along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Ordinary read; a fresh cache entry short-circuits the fetch.
    Normal,
    /// Cache-defeating re-fetch that ignores the local cache.
    Revalidate,
}

/// Bookkeeping for one outbound fetch.
#[derive(Debug)]
pub struct PendingFetch {
    mode: FetchMode,
    started_at: Instant,
    waiters: usize,
    stale: bool,
}

impl PendingFetch {
    fn new(mode: FetchMode) -> Self {
        Self {
            mode,
            started_at: Instant::now(),
            waiters: 0,
            stale: false,
        }
    }
}

/// Result of [`PendingRequests::start_or_join`].
#[derive(Debug)]
pub enum Join {
    /// The cache was filled between the caller's miss and the registry check.
    Cached(Resource),
    /// An existing fetch was joined.
    Joined(Option<SubscriptionId>),
    /// A new fetch was recorded; the caller must dispatch it.
    Started(Option<SubscriptionId>),
}

/// What a settled fetch hands back to its task.
pub struct Settlement {
    listeners: Vec<Listener>,
    outcome: Outcome,
    /// A revalidation was requested while this fetch was outbound.
    pub stale: bool,
    pub mode: FetchMode,
    pub elapsed: Duration,
}

impl Settlement {
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Hand the outcome to every collected listener.
    pub fn deliver(self) -> Outcome {
        deliver(&self.listeners, &self.outcome);
        self.outcome
    }
}

/// A seeded value written under the registry lock, awaiting delivery.
pub struct Seeded {
    listeners: Vec<Listener>,
    outcome: Outcome,
    /// Href pushed out of the cache by the seed.
    pub evicted: Option<String>,
}

impl Seeded {
    /// Hand the seed to the standing subscribers; returns how many it reached.
    pub fn deliver(self) -> usize {
        deliver(&self.listeners, &self.outcome);
        self.listeners.len()
    }
}

pub struct PendingRequests {
    inflight: DashMap<String, PendingFetch>,
    cache: Arc<ResourceCache>,
    bus: Arc<SubscriptionBus>,
}

impl PendingRequests {
    pub fn new(cache: Arc<ResourceCache>, bus: Arc<SubscriptionBus>) -> Self {
        Self {
            inflight: DashMap::new(),
            cache,
            bus,
        }
    }

    /// Join the fetch outstanding for `href`, or record a new one.
    ///
    /// A `Normal` request re-checks the cache before starting so it cannot
    /// race a settlement that landed after the caller's own cache miss. A
    /// `Revalidate` request arriving while a fetch is outbound marks that
    /// fetch stale so its task issues a fresh revalidation once it settles.
    pub fn start_or_join(&self, href: &str, mode: FetchMode, waiter: Option<&Listener>) -> Join {
        match self.inflight.entry(href.to_string()) {
            Entry::Occupied(mut occupied) => {
                let fetch = occupied.get_mut();
                if mode == FetchMode::Revalidate {
                    fetch.stale = true;
                }
                let id = waiter.map(|listener| {
                    fetch.waiters += 1;
                    self.bus.wait(href, Arc::clone(listener))
                });
                debug!(href, waiters = fetch.waiters, ?mode, "joined in-flight fetch");
                Join::Joined(id)
            }
            Entry::Vacant(vacant) => {
                if mode == FetchMode::Normal {
                    if let Some(resource) = self.cache.get(href) {
                        return Join::Cached(resource);
                    }
                }
                let mut fetch = PendingFetch::new(mode);
                let id = waiter.map(|listener| {
                    fetch.waiters += 1;
                    self.bus.wait(href, Arc::clone(listener))
                });
                vacant.insert(fetch);
                debug!(href, ?mode, "recorded new fetch");
                Join::Started(id)
            }
        }
    }

    /// Settle the fetch for `href`.
    ///
    /// A success is written to the cache first; then the waiters (and, for a
    /// success, the standing subscribers) are collected; only then is the
    /// entry removed. Delivery happens later, outside every lock, through
    /// [`Settlement::deliver`]. Settling an href with no recorded fetch
    /// touches neither the cache nor the bus.
    pub fn settle(&self, href: &str, outcome: Outcome) -> Settlement {
        let Entry::Occupied(occupied) = self.inflight.entry(href.to_string()) else {
            warn!(href, "settled a fetch that was never recorded");
            return Settlement {
                listeners: Vec::new(),
                outcome,
                stale: false,
                mode: FetchMode::Normal,
                elapsed: Duration::ZERO,
            };
        };

        if let Ok(resource) = &outcome {
            self.cache.set(resource.clone());
        }
        let listeners = self.bus.take_for_settlement(href, outcome.is_ok());
        let fetch = occupied.remove();

        Settlement {
            listeners,
            outcome,
            stale: fetch.stale,
            mode: fetch.mode,
            elapsed: fetch.started_at.elapsed(),
        }
    }

    /// Write a known-fresh value for its href and collect the standing
    /// subscribers, serialized with any settlement of the same href.
    pub fn seed(&self, resource: Resource) -> Seeded {
        let href = resource.href.clone();
        let _guard = self.inflight.entry(href.clone());
        let evicted = self.cache.set(resource.clone());
        let listeners = self.bus.standing(&href);
        Seeded {
            listeners,
            outcome: Ok(resource),
            evicted,
        }
    }

    pub fn is_pending(&self, href: &str) -> bool {
        self.inflight.contains_key(href)
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }
}
