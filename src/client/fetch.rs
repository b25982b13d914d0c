//! Reads: cache lookup, request coalescing and the background fetch task.

use std::sync::{Arc, Mutex};

use metrics::{counter, histogram};
use reqwest::Method;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::cache::lock::acquire;
use crate::cache::{FetchMode, Join, Listener, Outcome, Resource};
use crate::error::ClientError;
use crate::transport::{CACHE_CONTROL, PRAGMA, TransportRequest, TransportResponse};

use super::{Client, Subscription};

pub(crate) const METRIC_FETCH_TOTAL: &str = "hyperjson_fetch_total";
pub(crate) const METRIC_FETCH_JOINED: &str = "hyperjson_fetch_joined_total";
pub(crate) const METRIC_FETCH_MS: &str = "hyperjson_fetch_ms";
pub(crate) const METRIC_BUST_FAILED: &str = "hyperjson_bust_failed_total";

const NO_CACHE: &str = "max-age=0, no-store, no-cache";

impl Client {
    /// Read `href`, delivering the value to `listener`.
    ///
    /// A cached value is delivered before this returns and the listener stays
    /// subscribed to later updates. On a miss the listener waits for the
    /// single fetch outstanding for the URL and receives its outcome, error
    /// included, exactly once.
    pub fn get<F>(&self, href: &str, listener: F) -> Subscription
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.get_with(href, Arc::new(listener))
    }

    /// [`get`](Self::get) for the API root.
    pub fn root<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        let root = self.inner.root.to_string();
        self.get(&root, listener)
    }

    /// Follow `href` without triggering a fetch.
    pub fn subscribe<F>(&self, href: &str, listener: F) -> Subscription
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
        let id = self.inner.bus.subscribe(url.as_str(), Arc::new(listener));
        self.subscription(url.as_str(), Some(id))
    }

    /// Await a single outcome for `href`.
    pub async fn fetch(&self, href: &str) -> Result<Resource, ClientError> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let subscription = self.get(href, move |outcome| {
            if let Some(tx) = acquire(&slot, "client.fetch").take() {
                let _ = tx.send(outcome.clone());
            }
        });

        let outcome = rx
            .await
            .unwrap_or_else(|_| Err(ClientError::transport("fetch task ended without a result")));
        subscription.unsubscribe();
        outcome
    }

    pub(crate) fn get_with(&self, href: &str, listener: Listener) -> Subscription {
        let url = match self.resolve(href) {
            Ok(url) => url,
            Err(err) => {
                listener(&Err(err));
                return Subscription::inert(href);
            }
        };
        let href = url.as_str();

        if let Some(resource) = self.inner.cache.get(href) {
            debug!(href, "serving cached resource");
            return self.deliver_cached(href, resource, listener);
        }

        match self
            .inner
            .pending
            .start_or_join(href, FetchMode::Normal, Some(&listener))
        {
            Join::Cached(resource) => self.deliver_cached(href, resource, listener),
            Join::Joined(id) => {
                counter!(METRIC_FETCH_JOINED).increment(1);
                self.subscription(href, id)
            }
            Join::Started(id) => {
                self.spawn_fetch(href.to_string(), FetchMode::Normal);
                self.subscription(href, id)
            }
        }
    }

    fn deliver_cached(&self, href: &str, resource: Resource, listener: Listener) -> Subscription {
        listener(&Ok(resource));
        let id = self.inner.bus.subscribe(href, listener);
        self.subscription(href, Some(id))
    }

    pub(crate) fn spawn_fetch(&self, href: String, mode: FetchMode) {
        let client = self.clone();
        self.inner.runtime.spawn(client.run_fetch(href, mode));
    }

    #[instrument(skip(self))]
    async fn run_fetch(self, href: String, mode: FetchMode) {
        counter!(METRIC_FETCH_TOTAL).increment(1);
        let (outcome, response) = self.load(&href, mode).await;

        let settlement = self.inner.pending.settle(&href, outcome);
        let elapsed_ms = settlement.elapsed.as_secs_f64() * 1000.0;
        histogram!(METRIC_FETCH_MS).record(elapsed_ms);
        let listeners = settlement.listener_count();
        let stale = settlement.stale;

        match settlement.deliver() {
            Ok(_) => info!(listeners, elapsed_ms, "fetch settled"),
            Err(err) if mode == FetchMode::Revalidate => {
                counter!(METRIC_BUST_FAILED).increment(1);
                warn!(error = %err, listeners, "revalidation failed; cached value kept");
            }
            Err(err) => info!(error = %err, listeners, elapsed_ms, "fetch failed"),
        }

        if stale {
            debug!("revalidation requested mid-flight; fetching again");
            self.bust_cache(&href);
        }

        // Hold the raw response until listeners scheduled from delivery ran.
        tokio::task::yield_now().await;
        drop(response);
        trace!("released transport response");
    }

    async fn load(&self, href: &str, mode: FetchMode) -> (Outcome, Option<TransportResponse>) {
        let url = match Url::parse(href) {
            Ok(url) => url,
            Err(err) => return (Err(ClientError::invalid_url(href, err)), None),
        };

        let mut request = TransportRequest::new(Method::GET, url.clone());
        if mode == FetchMode::Revalidate {
            request.set_header(CACHE_CONTROL, NO_CACHE);
            request.set_header(PRAGMA, "no-cache");
        }
        self.inner.context.prepare(&mut request);

        match self.inner.transport.send(request).await {
            Ok(response) => {
                let outcome = self
                    .decode(&url, &response)
                    .map(|decoded| Resource::new(href, decoded.body, decoded.links));
                (outcome, Some(response))
            }
            Err(err) => (Err(err.into()), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::super::testing::*;
    use super::*;
    use crate::transport::{ChaosConfig, ChaosTransport, Transport, TransportError, TransportResponse};

    const ITEM: &str = "http://api.test/items/1";

    fn recorder() -> (Arc<Mutex<Vec<Outcome>>>, impl Fn(&Outcome) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |outcome: &Outcome| {
            sink.lock().expect("recorder lock").push(outcome.clone());
        })
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_request() {
        let transport = ScriptedTransport::new();
        transport.json(ITEM, r#"{"id": 1}"#);
        let gate = transport.hold();
        let client = client(&transport);

        let (first, first_listener) = recorder();
        let (second, second_listener) = recorder();
        client.get("/items/1", first_listener);
        client.get("/items/1", second_listener);
        assert!(client.is_pending("/items/1"));

        settle().await;
        gate.notify_waiters();
        settle().await;

        assert_eq!(transport.calls(), 1);
        let first = first.lock().expect("lock");
        let second = second.lock().expect("lock");
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        let (Ok(a), Ok(b)) = (&first[0], &second[0]) else {
            panic!("both listeners should see the resource");
        };
        assert!(a.body.ptr_eq(&b.body));
        assert!(!client.is_pending("/items/1"));
    }

    #[tokio::test]
    async fn cached_value_is_delivered_synchronously_then_updates_follow() {
        let transport = ScriptedTransport::new();
        transport.json(ITEM, r#"{"id": 1}"#);
        let client = client(&transport);
        client.fetch(ITEM).await.expect("warms cache");

        let (seen, listener) = recorder();
        let subscription = client.get(ITEM, listener);
        assert_eq!(seen.lock().expect("lock").len(), 1);
        assert_eq!(transport.calls(), 1);

        client.refresh(
            ITEM,
            Some(crate::cache::Seed::new(
                json!({"id": 1, "name": "renamed"}).into(),
                Default::default(),
            )),
        );
        assert_eq!(seen.lock().expect("lock").len(), 2);

        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn errors_reach_waiters_and_are_not_cached() {
        let transport = ScriptedTransport::new();
        transport.reply(ITEM, Ok(TransportResponse::new(500, r#"{"error": {"message": "boom"}}"#)));
        transport.json(ITEM, r#"{"id": 1}"#);
        let client = client(&transport);

        let standing = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&standing);
        client.subscribe(ITEM, move |_outcome| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = client.fetch(ITEM).await.expect_err("first fetch fails");
        assert_eq!(err, ClientError::from_status(500, r#"{"error": {"message": "boom"}}"#));
        assert_eq!(err.to_string(), "request failed with status 500: boom");
        assert_eq!(standing.load(Ordering::SeqCst), 0);
        assert!(!client.cache().contains(ITEM));

        client.fetch(ITEM).await.expect("second fetch succeeds");
        assert_eq!(transport.calls(), 2);
        assert_eq!(standing.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failures_surface_as_transport_errors() {
        let transport = ScriptedTransport::new();
        transport.reply(ITEM, Err(TransportError::timeout("Connection timeout")));
        let client = client(&transport);

        let err = client.fetch(ITEM).await.expect_err("times out");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn invalid_href_is_reported_synchronously() {
        let transport = ScriptedTransport::new();
        let client = Client::builder("mailto:nobody@example.com")
            .shared_transport(Arc::clone(&transport) as Arc<dyn crate::transport::Transport>)
            .build()
            .expect("builds");

        let (seen, listener) = recorder();
        let subscription = client.get("relative/path", listener);

        assert!(matches!(
            seen.lock().expect("lock").first(),
            Some(Err(ClientError::InvalidUrl { .. }))
        ));
        assert!(!subscription.unsubscribe());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn waiters_are_released_after_delivery() {
        let transport = ScriptedTransport::new();
        transport.json(ITEM, r#"{"id": 1}"#);
        let client = client(&transport);

        let (seen, listener) = recorder();
        client.get(ITEM, listener);
        settle().await;

        assert_eq!(seen.lock().expect("lock").len(), 1);
        assert_eq!(client.bus().waiter_count(ITEM), 0);

        client.refresh(ITEM, None);
        settle().await;
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    struct Counting {
        inner: ChaosTransport,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transport for Counting {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.send(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn injected_faults_are_still_coalesced() {
        let scripted = ScriptedTransport::new();
        scripted.json(ITEM, "{}");
        let counting = Arc::new(Counting {
            inner: ChaosTransport::with_seed(
                scripted.clone(),
                ChaosConfig {
                    weight: 1.0,
                    ..Default::default()
                },
                11,
            ),
            calls: AtomicUsize::new(0),
        });
        let client = Client::builder("http://api.test/")
            .shared_transport(counting.clone())
            .build()
            .expect("builds");

        let (a, b) = tokio::join!(client.fetch(ITEM), client.fetch(ITEM));

        assert!(a.is_err());
        assert_eq!(a, b);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scripted.calls(), 0);
        assert!(!client.cache().contains(ITEM));
    }

    #[tokio::test]
    async fn root_reads_the_api_root() {
        let transport = ScriptedTransport::new();
        transport.json("http://api.test/", r#"{"items": {"href": "/items"}}"#);
        let client = client(&transport);

        let (seen, listener) = recorder();
        client.root(listener);
        settle().await;

        let seen = seen.lock().expect("lock");
        let Some(Ok(resource)) = seen.first() else {
            panic!("root should load");
        };
        assert_eq!(resource.body.value()["items"]["href"], "http://api.test/items");
    }
}
