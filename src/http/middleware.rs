//! Admission middleware: one limiter decision per inbound request.

use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info};

use super::identity::IdentitySource;
use crate::ratelimit::{Clock, Limiter, Verdict};

/// Shared state for the admission middleware.
#[derive(Clone)]
pub struct AdmissionState {
    /// The decision engine
    pub limiter: Arc<dyn Limiter>,
    /// Time source for decisions
    pub clock: Arc<dyn Clock>,
    /// How clients are identified
    pub identity: IdentitySource,
}

impl AdmissionState {
    /// Create admission state identifying clients by peer address.
    pub fn new(limiter: Arc<dyn Limiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            clock,
            identity: IdentitySource::default(),
        }
    }

    /// Identify clients with `identity` instead.
    pub fn with_identity(mut self, identity: IdentitySource) -> Self {
        self.identity = identity;
        self
    }
}

impl std::fmt::Debug for AdmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionState")
            .field("algorithm", &self.limiter.algorithm())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Axum middleware that admits or rejects each request.
///
/// Admitted requests go to the downstream handler untouched. The decision
/// is final; nothing is retried here.
pub async fn admission(
    State(state): State<AdmissionState>,
    req: Request,
    next: Next,
) -> Response {
    let client = state.identity.resolve(&req);
    let now = state.clock.now();

    match state.limiter.decide(&client, now) {
        Verdict::Allow => {
            debug!(client = %client, method = %req.method(), "Request admitted");
            next.run(req).await
        }
        Verdict::Deny { retry_after } => {
            info!(
                client = %client,
                method = %req.method(),
                retry_after = ?retry_after,
                "Request rejected"
            );
            too_many_requests(retry_after)
        }
    }
}

/// Build the 429 response for a denial.
///
/// With a retry delay the response carries a `Retry-After` header and names
/// the delay in the body; without one it asks the client to try later.
pub fn too_many_requests(retry_after: Option<u64>) -> Response {
    let content_type = (CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    match retry_after {
        Some(secs) => (
            StatusCode::TOO_MANY_REQUESTS,
            [content_type, (RETRY_AFTER, HeaderValue::from(secs))],
            format!("Too many requests. Try again in {} seconds.", secs),
        )
            .into_response(),
        None => (
            StatusCode::TOO_MANY_REQUESTS,
            [content_type],
            "Too Many Requests. Please try again later.",
        )
            .into_response(),
    }
}
