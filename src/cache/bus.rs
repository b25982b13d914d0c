//! Per-URL publish/subscribe.
//!
//! Two kinds of interest share one topic map:
//!
//! - **standing** subscriptions follow a URL's value until unsubscribed and
//!   see every fetch success and every seeded value;
//! - **waiters** are one-shot: they receive the outcome of the fetch they
//!   joined, success or failure, and are dropped on delivery.
//!
//! Listeners are never invoked while the topic lock is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::ClientError;

use super::lock::acquire;
use super::store::Resource;

/// What a listener receives.
pub type Outcome = Result<Resource, ClientError>;

/// Callback registered against a URL.
pub type Listener = Arc<dyn Fn(&Outcome) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interest {
    Standing,
    Waiter,
}

struct Entry {
    id: SubscriptionId,
    interest: Interest,
    listener: Listener,
}

#[derive(Default)]
pub struct SubscriptionBus {
    topics: Mutex<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a standing interest in `href`.
    pub fn subscribe(&self, href: &str, listener: Listener) -> SubscriptionId {
        self.register(href, Interest::Standing, listener)
    }

    /// Register a one-shot waiter for the next fetch outcome of `href`.
    pub fn wait(&self, href: &str, listener: Listener) -> SubscriptionId {
        self.register(href, Interest::Waiter, listener)
    }

    fn register(&self, href: &str, interest: Interest, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        acquire(&self.topics, "bus.register")
            .entry(href.to_string())
            .or_default()
            .push(Entry {
                id,
                interest,
                listener,
            });
        trace!(href, id = %id, ?interest, "registered listener");
        id
    }

    /// Remove a subscription; returns false if it was already gone.
    pub fn unsubscribe(&self, href: &str, id: SubscriptionId) -> bool {
        let mut topics = acquire(&self.topics, "bus.unsubscribe");
        let Some(entries) = topics.get_mut(href) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            topics.remove(href);
        }
        removed
    }

    /// Listeners that should see a fetch outcome for `href`.
    ///
    /// Waiters are always drained. Standing subscribers are included only for
    /// a success; failures are never broadcast as a value change.
    pub(crate) fn take_for_settlement(&self, href: &str, success: bool) -> Vec<Listener> {
        let mut topics = acquire(&self.topics, "bus.settle");
        let Some(entries) = topics.get_mut(href) else {
            return Vec::new();
        };

        let mut listeners = Vec::with_capacity(entries.len());
        entries.retain(|entry| match entry.interest {
            Interest::Waiter => {
                listeners.push(Arc::clone(&entry.listener));
                false
            }
            Interest::Standing => {
                if success {
                    listeners.push(Arc::clone(&entry.listener));
                }
                true
            }
        });
        if entries.is_empty() {
            topics.remove(href);
        }
        listeners
    }

    /// Deliver a seeded value to the standing subscribers of `href`.
    pub fn broadcast(&self, href: &str, outcome: &Outcome) -> usize {
        let listeners = self.standing(href);
        deliver(&listeners, outcome);
        listeners.len()
    }

    pub(crate) fn standing(&self, href: &str) -> Vec<Listener> {
        acquire(&self.topics, "bus.standing")
            .get(href)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.interest == Interest::Standing)
                    .map(|entry| Arc::clone(&entry.listener))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, href: &str) -> usize {
        self.count(href, Interest::Standing)
    }

    pub fn waiter_count(&self, href: &str) -> usize {
        self.count(href, Interest::Waiter)
    }

    fn count(&self, href: &str, interest: Interest) -> usize {
        acquire(&self.topics, "bus.count")
            .get(href)
            .map(|entries| entries.iter().filter(|e| e.interest == interest).count())
            .unwrap_or(0)
    }
}

pub(crate) fn deliver(listeners: &[Listener], outcome: &Outcome) {
    for listener in listeners {
        listener(outcome);
    }
}
