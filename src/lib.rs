//! Tollgate - Per-Client HTTP Request Admission
//!
//! This crate limits how many requests a single client may make in a
//! trailing time interval. Each inbound request is admitted or rejected
//! with `429 Too Many Requests` by one of two decision engines: a
//! fixed-window counter or an exact sliding-window log.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
