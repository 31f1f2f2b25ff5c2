//! HTTP load testing driven by curl-style command templates.
//!
//! A run takes one request template (a `curl` invocation as it would be
//! pasted into a shell), an optional CSV file of variable rows, and a
//! target rate, then replays the templated request against the target
//! while collecting latency and outcome statistics.
//!
//! # Features
//!
//! - curl-style template parsing (`-X`, `-H`, `-d`, quoting, line
//!   continuations)
//! - `{{row.column}}` placeholder substitution from CSV rows, cycled
//!   per request
//! - Paced request scheduling toward a target RPS with a bounded
//!   catch-up burst, plus a hard concurrency cap
//! - HdrHistogram-backed latency percentiles and per-status-code counts
//! - Graceful stop with a configurable drain grace period

pub mod client;
pub mod config;
pub mod controller;
pub mod data_source;
pub mod errors;
pub mod executor;
pub mod pacing;
pub mod percentiles;
pub mod stats;
pub mod substitute;
pub mod template;
pub mod utils;
