//! Post-mutation update planning.
//!
//! Turns a successful write into the set of hrefs whose cached value must be
//! seeded or re-validated, deduplicated so each href is refreshed once.

use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::document::Document;
use crate::links::{INVALIDATES, LinkMap};

/// A known-fresh value to write into the cache without a round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub body: Document,
    pub links: LinkMap,
}

impl Seed {
    pub fn new(body: Document, links: LinkMap) -> Self {
        Self { body, links }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Re-fetch with cache-defeating headers; no fresh body is known.
    Revalidate,
    /// Write the seed, then re-fetch in the background.
    Seed(Seed),
}

/// The parts of a mutation response that drive invalidation.
#[derive(Debug, Clone, Copy)]
pub struct MutationResult<'a> {
    /// URL the write was sent to.
    pub action: &'a Url,
    pub body: &'a Document,
    pub links: &'a LinkMap,
    pub content_location: Option<&'a str>,
    pub location: Option<&'a str>,
}

/// Deduplicated href → [`Update`] mapping.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateSet {
    updates: BTreeMap<String, Update>,
}

impl fmt::Display for UpdateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seeds = self
            .updates
            .values()
            .filter(|update| matches!(update, Update::Seed(_)))
            .count();
        write!(
            f,
            "UpdateSet {{ seed: {seeds}, revalidate: {} }}",
            self.updates.len() - seeds
        )
    }
}

impl UpdateSet {
    /// Plan the updates implied by a successful non-`GET` mutation.
    ///
    /// - the action URL is re-validated;
    /// - the body's own `href` and the `content-location` are seeded with the
    ///   response body and links;
    /// - `location` and every `invalidates` link are re-validated.
    ///
    /// All hrefs are resolved against the action URL before merging, and a
    /// seed always wins over a re-validation of the same href.
    pub fn plan(result: &MutationResult<'_>) -> Self {
        let mut set = Self::default();
        let seed = || Update::Seed(Seed::new(result.body.clone(), result.links.clone()));

        set.insert(result.action.as_str(), Update::Revalidate);

        if let Some(href) = result.body.href() {
            set.insert(&resolve(result.action, href), seed());
        }
        if let Some(href) = result.content_location {
            set.insert(&resolve(result.action, href), seed());
        }
        if let Some(href) = result.location {
            set.insert(&resolve(result.action, href), Update::Revalidate);
        }
        for href in result.links.hrefs(INVALIDATES) {
            set.insert(&resolve(result.action, href), Update::Revalidate);
        }

        set
    }

    pub fn insert(&mut self, href: &str, update: Update) {
        match self.updates.get_mut(href) {
            Some(existing @ Update::Revalidate) => {
                if matches!(update, Update::Seed(_)) {
                    *existing = update;
                }
            }
            Some(Update::Seed(_)) => {}
            None => {
                self.updates.insert(href.to_string(), update);
            }
        }
    }

}

impl IntoIterator for UpdateSet {
    type Item = (String, Update);
    type IntoIter = std::collections::btree_map::IntoIter<String, Update>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

fn resolve(base: &Url, href: &str) -> String {
    base.join(href)
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}
