//! `Link:` header parsing.
//!
//! Produces a relation → target mapping. A relation seen once maps to a single
//! href; repeated relations accumulate into an ordered list.

use std::collections::BTreeMap;

use url::Url;

/// Relation naming resources a mutation made stale.
pub const INVALIDATES: &str = "invalidates";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    One(String),
    Many(Vec<String>),
}

impl LinkTarget {
    pub fn hrefs(&self) -> &[String] {
        match self {
            Self::One(href) => std::slice::from_ref(href),
            Self::Many(hrefs) => hrefs,
        }
    }

    fn push(&mut self, href: String) {
        match self {
            Self::One(first) => {
                let first = std::mem::take(first);
                *self = Self::Many(vec![first, href]);
            }
            Self::Many(hrefs) => hrefs.push(href),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMap(BTreeMap<String, LinkTarget>);

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rel: &str, href: impl Into<String>) {
        let href = href.into();
        let rel = rel.to_ascii_lowercase();
        match self.0.get_mut(&rel) {
            Some(target) => target.push(href),
            None => {
                self.0.insert(rel, LinkTarget::One(href));
            }
        }
    }

    pub fn get(&self, rel: &str) -> Option<&LinkTarget> {
        self.0.get(&rel.to_ascii_lowercase())
    }

    /// Every href under `rel`; empty when the relation is absent.
    pub fn hrefs(&self, rel: &str) -> &[String] {
        self.get(rel).map(LinkTarget::hrefs).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LinkTarget)> {
        self.0.iter().map(|(rel, target)| (rel.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse a raw `Link:` header value, resolving targets against `base`.
///
/// Link values without a `rel` parameter, or that do not start with a
/// `<target>`, are skipped.
pub fn parse_link_header(value: &str, base: &Url) -> LinkMap {
    let mut links = LinkMap::new();

    for link_value in split_outside_quotes(value, ',') {
        let link_value = link_value.trim();
        let Some(rest) = link_value.strip_prefix('<') else {
            continue;
        };
        let Some(end) = rest.find('>') else {
            continue;
        };
        let target = rest[..end].trim();
        let href = base
            .join(target)
            .map(String::from)
            .unwrap_or_else(|_| target.to_string());

        for param in split_outside_quotes(&rest[end + 1..], ';') {
            let Some((name, raw)) = param.split_once('=') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            let rels = raw.trim().trim_matches('"');
            for rel in rels.split_ascii_whitespace() {
                links.insert(rel, href.clone());
            }
        }
    }

    links
}

fn split_outside_quotes(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_target = false;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        match ch {
            '"' if !in_target => in_quotes = !in_quotes,
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            c if c == separator && !in_quotes && !in_target => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}
