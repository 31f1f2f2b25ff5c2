//! Single-attempt HTTP execution.
//!
//! The executor is the only place traffic touches the network. It always
//! hands back a `RequestResult`: a response of any status is a recorded
//! exchange, and every non-response condition is classified into an
//! `ErrorKind`. Nothing propagates past this boundary.

use reqwest::header::{HeaderName, HeaderValue};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::errors::ErrorKind;
use crate::substitute::ResolvedRequest;

/// Outcome of one attempt: an HTTP status, or a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Status(u16),
    Failure(ErrorKind),
}

impl RequestOutcome {
    /// True when an HTTP response was received, whatever its status.
    pub fn is_response(&self) -> bool {
        matches!(self, RequestOutcome::Status(_))
    }
}

/// Everything recorded about one attempt.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub attempt_id: u64,

    /// Offset from run start at dispatch time; lets a consumer reconstruct
    /// approximate issuance order after the fact.
    pub issued_at: Duration,

    /// Wall-clock time from dispatch to completion (response or failure).
    pub latency: Duration,

    pub outcome: RequestOutcome,
}

impl RequestResult {
    /// A result for an attempt that failed without completing an exchange.
    pub fn failure(
        attempt_id: u64,
        issued_at: Duration,
        latency: Duration,
        kind: ErrorKind,
    ) -> Self {
        Self {
            attempt_id,
            issued_at,
            latency,
            outcome: RequestOutcome::Failure(kind),
        }
    }
}

/// Issues resolved requests over a shared client with a fixed per-request
/// timeout.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Send one resolved request and record what happened.
    ///
    /// # Arguments
    /// * `request` - The resolved request; consumed by this attempt
    /// * `attempt_id` - Sequential id assigned at dispatch
    /// * `issued_at` - Offset from run start at dispatch
    ///
    /// # Returns
    /// The attempt's `RequestResult`; this function never fails
    pub async fn execute(
        &self,
        request: ResolvedRequest,
        attempt_id: u64,
        issued_at: Duration,
    ) -> RequestResult {
        let start = Instant::now();

        let outcome = match self.send(request).await {
            Ok(status) => RequestOutcome::Status(status),
            Err(kind) => RequestOutcome::Failure(kind),
        };

        let latency = start.elapsed();
        trace!(
            attempt_id,
            outcome = ?outcome,
            latency_ms = latency.as_millis() as u64,
            "Attempt finished"
        );

        RequestResult {
            attempt_id,
            issued_at,
            latency,
            outcome,
        }
    }

    async fn send(&self, request: ResolvedRequest) -> Result<u16, ErrorKind> {
        let ResolvedRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;

        let mut builder = self.client.request(method, url).timeout(self.timeout);

        for (name, value) in &headers {
            // A resolved header that cannot form a valid HTTP header is a
            // protocol failure before anything is sent.
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| ErrorKind::Protocol)?;
            let value = HeaderValue::from_str(value).map_err(|_| ErrorKind::Protocol)?;
            builder = builder.header(name, value);
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            let kind = ErrorKind::from_reqwest_error(&e);
            debug!(error = %e, kind = %kind, "Request failed");
            kind
        })?;

        let status = response.status().as_u16();

        // Drain the body so latency covers the whole exchange and the
        // connection goes back to the pool.
        let _ = response.bytes().await;

        Ok(status)
    }
}
