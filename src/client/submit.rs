//! Writes and the invalidation they trigger.

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::cache::{MutationResult, UpdateSet};
use crate::error::ClientError;
use crate::transport::TransportRequest;

use super::{Client, Submission};

impl Client {
    /// Send `body` to `href` with `method` and hand the decoded result to
    /// `callback`.
    ///
    /// A `GET` encodes an object or string body as the query string and has
    /// no cache side effects. Any other method sends the body as JSON; once the
    /// callback has run, resources named by the response are seeded or
    /// re-validated (see [`UpdateSet::plan`]).
    pub fn submit<F>(&self, method: Method, href: &str, body: Option<Value>, callback: F)
    where
        F: FnOnce(Result<Submission, ClientError>) + Send + 'static,
    {
        let client = self.clone();
        let href = href.to_string();
        self.inner.runtime.spawn(async move {
            client.run_submit(method, href, body, callback).await;
        });
    }

    #[instrument(skip(self, body, callback))]
    async fn run_submit<F>(self, method: Method, href: String, body: Option<Value>, callback: F)
    where
        F: FnOnce(Result<Submission, ClientError>) + Send + 'static,
    {
        match self.perform(&method, &href, body).await {
            Ok((submission, updates)) => {
                callback(Ok(submission));
                if let Some(updates) = updates {
                    self.apply_updates(updates);
                }
            }
            Err(err) => {
                debug!(error = %err, "submit failed");
                callback(Err(err));
            }
        }
    }

    async fn perform(
        &self,
        method: &Method,
        href: &str,
        body: Option<Value>,
    ) -> Result<(Submission, Option<UpdateSet>), ClientError> {
        let mut url = self.resolve(href)?;
        let is_read = *method == Method::GET;
        if is_read {
            if let Some(body) = &body {
                encode_query(&mut url, body)?;
            }
        }

        let mut request = TransportRequest::new(method.clone(), url.clone());
        if !is_read {
            request.body = body;
        }
        self.inner.context.prepare(&mut request);

        let response = self.inner.transport.send(request).await?;
        let decoded = self.decode(&url, &response)?;

        let updates = (!is_read).then(|| {
            UpdateSet::plan(&MutationResult {
                action: &url,
                body: &decoded.body,
                links: &decoded.links,
                content_location: decoded.content_location.as_deref(),
                location: decoded.location.as_deref(),
            })
        });

        let href = decoded.content_location.or(decoded.location);
        Ok((
            Submission {
                body: decoded.body,
                links: decoded.links,
                href,
            },
            updates,
        ))
    }
}

/// Append a `GET` body to the query string.
///
/// Object fields become pairs: strings as-is, `null` as an empty value,
/// anything else as its JSON text. A string body is appended verbatim as an
/// already-encoded query.
fn encode_query(url: &mut Url, body: &Value) -> Result<(), ClientError> {
    match body {
        Value::Null => {}
        Value::String(query) => {
            let query = query.trim_start_matches('?');
            if !query.is_empty() {
                let joined = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                    _ => query.to_string(),
                };
                url.set_query(Some(&joined));
            }
        }
        Value::Object(fields) => {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in fields {
                match value {
                    Value::String(text) => pairs.append_pair(key, text),
                    Value::Null => pairs.append_pair(key, ""),
                    other => pairs.append_pair(key, &other.to_string()),
                };
            }
        }
        other => {
            return Err(ClientError::invalid_url(
                url.as_str(),
                format!("a query body must be an object or a string, not `{other}`"),
            ));
        }
    }
    Ok(())
}
