//! Decoded response bodies.
//!
//! The codec turns raw response text into a [`Document`]: the JSON value with
//! every `href` resolved to an absolute URL, plus the document's own
//! identifying `href` when the top-level object carries one.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::ClientError;

const HREF: &str = "href";

/// Decoded body shared between the cache and every listener it reaches.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    value: Arc<Value>,
    href: Option<String>,
}

impl Document {
    pub fn new(value: Value) -> Self {
        let href = value.get(HREF).and_then(Value::as_str).map(str::to_string);
        Self {
            value: Arc::new(value),
            href,
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Identifying `href` of the top-level object, if any.
    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    /// True when both documents share one decoded allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Injected body decoder.
pub trait BodyCodec: Send + Sync {
    fn decode(&self, text: &str, base: &Url) -> Result<Document, ClientError>;
}

/// Hypermedia JSON codec.
///
/// Blank bodies decode to `null`. Every string field named `href`, at any
/// depth, is resolved against `base`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn decode(&self, text: &str, base: &Url) -> Result<Document, ClientError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Document::null());
        }

        let mut value: Value =
            serde_json::from_str(trimmed).map_err(|err| ClientError::decode(err.to_string()))?;
        resolve_hrefs(&mut value, base);
        Ok(Document::new(value))
    }
}

fn resolve_hrefs(value: &mut Value, base: &Url) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(href) if key == HREF => {
                        if let Ok(absolute) = base.join(href) {
                            *href = absolute.into();
                        }
                    }
                    _ => resolve_hrefs(child, base),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_hrefs(item, base);
            }
        }
        _ => {}
    }
}
