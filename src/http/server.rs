//! HTTP server implementation.

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use chrono::{DateTime, SecondsFormat, Utc};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::middleware::{admission, AdmissionState};
use crate::error::{Result, TollgateError};
use crate::ratelimit::Algorithm;

/// HTTP server fronting the downstream handler with admission control.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Admission state shared by every request
    state: AdmissionState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AdmissionState) -> Self {
        Self { addr, state }
    }

    /// Build the router: the downstream handler on `/`, behind admission.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(downstream))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                admission,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            TollgateError::Io(e)
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            algorithm = %self.state.limiter.algorithm(),
            "Starting HTTP server with admission control"
        );

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Io(e)
        })
    }
}

/// The handler behind admission. Its body is a success marker only.
async fn downstream(State(state): State<AdmissionState>) -> Response {
    let body = match state.limiter.algorithm() {
        Algorithm::FixedWindow => {
            let now = state.clock.now().as_millis();
            let date = i64::try_from(now)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now);
            format!(
                "Passed \tDate: {}\n",
                date.to_rfc3339_opts(SecondsFormat::Millis, true)
            )
        }
        Algorithm::SlidingWindow => "Hello, world!".to_string(),
    };

    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        body,
    )
        .into_response()
}
