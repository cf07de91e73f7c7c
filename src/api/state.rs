//! Application state shared across handlers.

use std::sync::Arc;

use crate::upstream::UpstreamClient;

/// Application state shared across all handlers.
///
/// `upstream` is `None` when the server-side API token is missing; every
/// request that would need it then answers with a configuration error
/// instead of the process refusing to start.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Option<Arc<UpstreamClient>>,
}

impl AppState {
    pub fn new(upstream: UpstreamClient) -> Self {
        Self {
            upstream: Some(Arc::new(upstream)),
        }
    }

    /// State for a server without a configured upstream credential.
    pub fn unconfigured() -> Self {
        Self { upstream: None }
    }
}
