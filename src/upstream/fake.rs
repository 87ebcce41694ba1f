//! In-process transport for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PreparedRequest, RawResponse, Transport, TransportError};

/// Answers by host + path; unknown routes fail with a network error
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, RawResponse>>,
    seen: Mutex<Vec<PreparedRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a response for `host_path` (e.g. `"ave.test/v2/ranks"`)
    pub(crate) fn route(self, host_path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(host_path.to_string(), RawResponse::new(status, body));
        self
    }

    pub(crate) fn requests(&self) -> Vec<PreparedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let key = format!(
            "{}{}",
            request.url.host_str().unwrap_or_default(),
            request.url.path()
        );
        self.seen.lock().unwrap().push(request);
        self.routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::Network(format!("no route for {key}")))
    }
}
