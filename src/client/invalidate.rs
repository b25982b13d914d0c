//! Seeding, cache busting and explicit clears.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{FetchMode, Join, Outcome, Resource, Seed, Update, UpdateSet};

use super::{Client, Subscription};

impl Client {
    /// Replace the cached value of `href` with `seed` (if any), tell its
    /// subscribers, then re-validate it in the background.
    ///
    /// A failed re-validation is logged and otherwise ignored; subscribers
    /// keep the last good value.
    pub fn refresh(&self, href: &str, seed: Option<Seed>) {
        match self.resolve(href) {
            Ok(url) => self.refresh_resolved(url.as_str(), seed),
            Err(err) => warn!(error = %err, "refresh skipped"),
        }
    }

    /// Drop the cached value of `href` and re-fetch it, bypassing any HTTP
    /// caches on the way. `listener` receives the outcome of that fetch once.
    pub fn clear<F>(&self, href: &str, listener: F) -> Subscription
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        let url = match self.resolve(href) {
            Ok(url) => url,
            Err(err) => {
                listener(&Err(err));
                return Subscription::inert(href);
            }
        };
        let href = url.as_str();
        let removed = self.inner.cache.delete(href).is_some();
        debug!(href, removed, "cleared cached resource");

        let listener: crate::cache::Listener = Arc::new(listener);
        match self
            .inner
            .pending
            .start_or_join(href, FetchMode::Revalidate, Some(&listener))
        {
            Join::Started(id) => {
                self.spawn_fetch(href.to_string(), FetchMode::Revalidate);
                self.subscription(href, id)
            }
            Join::Joined(id) => self.subscription(href, id),
            Join::Cached(resource) => {
                listener(&Ok(resource));
                self.subscription(href, None)
            }
        }
    }

    pub(crate) fn apply_updates(&self, updates: UpdateSet) {
        info!(plan = %updates, "applying mutation updates");
        for (href, update) in updates {
            match update {
                Update::Seed(seed) => self.refresh_resolved(&href, Some(seed)),
                Update::Revalidate => self.refresh_resolved(&href, None),
            }
        }
    }

    fn refresh_resolved(&self, href: &str, seed: Option<Seed>) {
        if let Some(seed) = seed {
            let seeded = self
                .inner
                .pending
                .seed(Resource::new(href, seed.body, seed.links));
            if let Some(evicted) = &seeded.evicted {
                debug!(href, evicted = %evicted, "seed evicted least recently used resource");
            }
            let reached = seeded.deliver();
            debug!(href, reached, "seeded resource");
        }
        self.bust_cache(href);
    }

    /// Start a cache-defeating fetch of `href`. If one is already outbound it
    /// is marked stale and a fresh one follows when it settles.
    pub(crate) fn bust_cache(&self, href: &str) {
        match self
            .inner
            .pending
            .start_or_join(href, FetchMode::Revalidate, None)
        {
            Join::Started(_) => self.spawn_fetch(href.to_string(), FetchMode::Revalidate),
            Join::Joined(_) => debug!(href, "revalidation queued behind in-flight fetch"),
            Join::Cached(_) => {}
        }
    }
}
