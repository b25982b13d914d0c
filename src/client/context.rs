use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::cache::lock::acquire;
use crate::transport::{AUTHORIZATION, TransportRequest};

/// Hook run on every outbound request after default headers are applied.
pub type Interceptor = Arc<dyn Fn(&mut TransportRequest) + Send + Sync>;

/// Headers and interceptors shared by every request the client sends.
#[derive(Default)]
pub(crate) struct RequestContext {
    headers: Mutex<Vec<(String, String)>>,
    interceptors: Mutex<Vec<Interceptor>>,
}

impl RequestContext {
    pub(crate) fn set_header(&self, name: &str, value: impl Into<String>) {
        let mut headers = acquire(&self.headers, "context.set_header");
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        headers.push((name.to_ascii_lowercase(), value.into()));
    }

    pub(crate) fn set_basic_auth(&self, user: &str, password: &str) {
        let token = STANDARD.encode(format!("{user}:{password}"));
        self.set_header(AUTHORIZATION, format!("Basic {token}"));
    }

    pub(crate) fn add_interceptor(&self, interceptor: Interceptor) {
        acquire(&self.interceptors, "context.add_interceptor").push(interceptor);
    }

    /// Apply default headers the request does not already carry, then run
    /// interceptors in registration order.
    pub(crate) fn prepare(&self, request: &mut TransportRequest) {
        let headers = acquire(&self.headers, "context.prepare").clone();
        for (name, value) in headers {
            if request.header(&name).is_none() {
                request.set_header(&name, value);
            }
        }

        let interceptors = acquire(&self.interceptors, "context.prepare").clone();
        for interceptor in interceptors {
            interceptor(request);
        }
    }
}
