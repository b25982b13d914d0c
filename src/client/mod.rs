//! The public client: cached reads, subscriptions, writes and invalidation.
//!
//! Every operation resolves its href against the API root first, so the
//! cache, the in-flight registry and the subscription bus are all keyed by
//! absolute URL. Callbacks run either synchronously (cache hits, invalid
//! hrefs) or on the runtime captured when the client was built.

mod context;
mod fetch;
mod invalidate;
mod submit;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::warn;
use url::Url;

use crate::cache::{
    CacheConfig, PendingRequests, ResourceCache, SubscriptionBus, SubscriptionId,
};
use crate::config::Settings;
use crate::document::{BodyCodec, Document, JsonCodec};
use crate::error::{BuildError, ClientError};
use crate::links::{LinkMap, parse_link_header};
use crate::transport::{
    CONTENT_LOCATION, ChaosConfig, ChaosTransport, HttpTransport, LINK, LOCATION, Transport,
    TransportRequest, TransportResponse,
};

pub use context::Interceptor;
pub(crate) use context::RequestContext;
pub(crate) use fetch::{METRIC_BUST_FAILED, METRIC_FETCH_JOINED, METRIC_FETCH_MS, METRIC_FETCH_TOTAL};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to a shared resource cache. Cloning is cheap and every clone sees
/// the same cache, registry and subscriptions.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    root: Url,
    cache: Arc<ResourceCache>,
    bus: Arc<SubscriptionBus>,
    pending: PendingRequests,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn BodyCodec>,
    context: RequestContext,
    runtime: Handle,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("root", &self.inner.root.as_str())
            .field("cached", &self.inner.cache.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

pub struct ClientBuilder {
    root: String,
    cache: CacheConfig,
    timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
    codec: Option<Arc<dyn BodyCodec>>,
    runtime: Option<Handle>,
    headers: Vec<(String, String)>,
    credentials: Option<(String, String)>,
}

impl ClientBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            cache: CacheConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            transport: None,
            codec: None,
            runtime: None,
            headers: Vec::new(),
            credentials: None,
        }
    }

    /// Builder preloaded from resolved settings, including fault injection
    /// when `chaos.enabled` is set.
    pub fn from_settings(settings: &Settings) -> Result<Self, BuildError> {
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(settings.client.timeout)?);
        let transport: Arc<dyn Transport> = if settings.chaos.enabled {
            let chaos = ChaosConfig::from(&settings.chaos);
            warn!(weight = chaos.weight, "fault injection enabled for all requests");
            Arc::new(ChaosTransport::new(http, chaos))
        } else {
            http
        };

        let mut builder = Self::new(settings.client.api_root.as_str())
            .cache_config(CacheConfig::from(&settings.client))
            .timeout(settings.client.timeout)
            .shared_transport(transport);
        for (name, value) in &settings.client.headers {
            builder = builder.header(name, value.clone());
        }
        if let Some((user, password)) = &settings.client.credentials {
            builder = builder.auth(user, password);
        }
        Ok(builder)
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.cache = CacheConfig::with_max_size(max_size);
        self
    }

    /// Request timeout for the default HTTP transport. Ignored when a
    /// transport is supplied explicitly.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.shared_transport(Arc::new(transport))
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: BodyCodec + 'static,
    {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Runtime that background fetches are spawned on. Defaults to the
    /// runtime current at [`build`](Self::build) time.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn auth(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn build(self) -> Result<Client, BuildError> {
        let root = Url::parse(&self.root).map_err(|source| BuildError::InvalidRoot {
            root: self.root.clone(),
            source,
        })?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.timeout)?),
        };
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));

        let context = RequestContext::default();
        for (name, value) in self.headers {
            context.set_header(&name, value);
        }
        if let Some((user, password)) = &self.credentials {
            context.set_basic_auth(user, password);
        }

        let cache = Arc::new(ResourceCache::new(&self.cache));
        let bus = Arc::new(SubscriptionBus::new());
        let pending = PendingRequests::new(Arc::clone(&cache), Arc::clone(&bus));

        Ok(Client {
            inner: Arc::new(Inner {
                root,
                cache,
                bus,
                pending,
                transport,
                codec,
                context,
                runtime,
            }),
        })
    }
}

impl Client {
    pub fn builder(root: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(root)
    }

    pub fn api_root(&self) -> &Url {
        &self.inner.root
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.inner.cache
    }

    pub fn bus(&self) -> &SubscriptionBus {
        &self.inner.bus
    }

    /// Whether a fetch for `href` is currently outbound.
    pub fn is_pending(&self, href: &str) -> bool {
        self.resolve(href)
            .map(|url| self.inner.pending.is_pending(url.as_str()))
            .unwrap_or(false)
    }

    /// Resolve `href` against the API root.
    pub fn resolve(&self, href: &str) -> Result<Url, ClientError> {
        self.inner
            .root
            .join(href)
            .map_err(|err| ClientError::invalid_url(href, err))
    }

    /// Send basic credentials with every subsequent request.
    pub fn auth(&self, user: &str, password: &str) -> &Self {
        self.inner.context.set_basic_auth(user, password);
        self
    }

    /// Send `name: value` with every subsequent request unless the request
    /// sets the header itself.
    pub fn header(&self, name: &str, value: impl Into<String>) -> &Self {
        self.inner.context.set_header(name, value);
        self
    }

    pub fn intercept<F>(&self, interceptor: F) -> &Self
    where
        F: Fn(&mut TransportRequest) + Send + Sync + 'static,
    {
        self.inner.context.add_interceptor(Arc::new(interceptor));
        self
    }

    fn subscription(&self, href: &str, id: Option<SubscriptionId>) -> Subscription {
        Subscription {
            href: href.to_string(),
            id,
            bus: Arc::downgrade(&self.inner.bus),
        }
    }

    /// Decode a transport response fetched from `url`.
    ///
    /// The body is resolved against `content-location` (or `location`) when
    /// present; `link` header targets are resolved against the request URL.
    fn decode(&self, url: &Url, response: &TransportResponse) -> Result<Decoded, ClientError> {
        if !response.is_success() {
            return Err(ClientError::from_status(response.status, &response.text));
        }

        let content_location = response
            .header(CONTENT_LOCATION)
            .and_then(|href| url.join(href).ok());
        let location = response
            .header(LOCATION)
            .and_then(|href| url.join(href).ok());

        let base = content_location.as_ref().or(location.as_ref()).unwrap_or(url);
        let body = self.inner.codec.decode(&response.text, base)?;
        let links = response
            .header(LINK)
            .map(|value| parse_link_header(value, url))
            .unwrap_or_default();

        Ok(Decoded {
            body,
            links,
            content_location: content_location.map(String::from),
            location: location.map(String::from),
        })
    }
}

struct Decoded {
    body: Document,
    links: LinkMap,
    content_location: Option<String>,
    location: Option<String>,
}

/// Handle returned by [`Client::get`] and friends.
///
/// Dropping it does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[derive(Clone)]
pub struct Subscription {
    href: String,
    id: Option<SubscriptionId>,
    bus: Weak<SubscriptionBus>,
}

impl Subscription {
    fn inert(href: &str) -> Self {
        Self {
            href: href.to_string(),
            id: None,
            bus: Weak::new(),
        }
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Stop receiving updates. Returns false if nothing was registered or the
    /// listener was already removed; calling it twice is harmless.
    pub fn unsubscribe(&self) -> bool {
        match (self.id, self.bus.upgrade()) {
            (Some(id), Some(bus)) => bus.unsubscribe(&self.href, id),
            _ => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("href", &self.href)
            .field("id", &self.id)
            .finish()
    }
}

/// Successful result of [`Client::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub body: Document,
    pub links: LinkMap,
    /// `content-location`, else `location`, resolved against the request URL.
    pub href: Option<String>,
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn hrefs_resolve_against_the_api_root() {
        let transport = ScriptedTransport::new();
        let client = client(&transport);

        assert_eq!(
            client.resolve("/items/5").expect("resolves").as_str(),
            "http://api.test/items/5"
        );
        assert_eq!(
            client.resolve("http://other.test/x").expect("resolves").as_str(),
            "http://other.test/x"
        );
    }

    #[test]
    fn build_outside_runtime_fails() {
        let result = Client::builder("http://api.test/")
            .transport(HttpTransport::from_client(reqwest::Client::new()))
            .build();
        assert!(matches!(result, Err(BuildError::NoRuntime)));
    }

    #[tokio::test]
    async fn invalid_root_is_rejected() {
        let result = Client::builder("not a url").build();
        assert!(matches!(result, Err(BuildError::InvalidRoot { .. })));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let transport = ScriptedTransport::new();
        transport.json("http://api.test/items/1", r#"{"id": 1}"#);
        let client = client(&transport);

        let subscription = client.subscribe("/items/1", |_outcome| {});
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
    }

    #[tokio::test]
    async fn default_headers_and_auth_reach_the_transport() {
        let transport = ScriptedTransport::new();
        transport.json("http://api.test/", "{}");
        let client = client(&transport);
        client.header("Accept", "application/json").auth("u", "p");

        client.fetch("/").await.expect("root loads");

        let sent = transport.sent();
        assert_eq!(sent[0].header("accept"), Some("application/json"));
        assert_eq!(sent[0].header("authorization"), Some("Basic dTpw"));
    }

    #[tokio::test]
    async fn body_hrefs_resolve_against_content_location() {
        let transport = ScriptedTransport::new();
        transport.reply(
            "http://api.test/items/latest",
            Ok(TransportResponse::new(200, r#"{"next": {"href": "6"}}"#)
                .with_header("Content-Location", "/items/5")),
        );
        let client = client(&transport);

        let resource = client.fetch("/items/latest").await.expect("loads");
        assert_eq!(resource.href, "http://api.test/items/latest");
        assert_eq!(
            resource.body.value()["next"]["href"],
            "http://api.test/items/6"
        );
    }
}
