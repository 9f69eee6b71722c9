//! HTTP transport adapter for the admission engine.

mod identity;
mod middleware;
mod probe;
mod server;

pub use identity::IdentitySource;
pub use middleware::{admission, too_many_requests, AdmissionState};
pub use probe::{probe, ProbeOutcome, ProbeResult};
pub use server::HttpServer;
