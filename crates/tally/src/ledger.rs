//! HTTP client for the ledger canister.
//!
//! Every failure becomes an [`OperationResult::Failure`]; nothing past
//! [`LedgerClient::invoke`] returns an error to the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tallyconf::LedgerConfig;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::request::LedgerRequest;
use crate::types::{OperationCall, OperationResult};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not connect to the ledger: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("ledger returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not parse ledger response: {0}")]
    Decode(#[source] reqwest::Error),

    /// A transfer whose fate is unknown. Never retried.
    #[error(
        "outcome unknown: the transfer may or may not have been broadcast ({reason}); \
         check the balance before retrying"
    )]
    Ambiguous { reason: String },
}

impl LedgerError {
    /// Worth another attempt for a read-only request
    fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Transport(_) | Self::Decode(_) | Self::Ambiguous { .. } => false,
        }
    }
}

/// Client for the ledger's JSON endpoints
pub struct LedgerClient {
    base_url: String,
    host: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
    read_retries: u32,
    retry_backoff: Duration,
    catalog: Arc<Catalog>,
}

impl LedgerClient {
    pub fn new(config: &LedgerConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build ledger HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            host: config
                .canister_id
                .as_ref()
                .map(|id| format!("{}.localhost", id)),
            client,
            timeout,
            read_retries: config.read_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            catalog,
        })
    }

    /// Execute one call. Unknown names fail without touching the network.
    #[tracing::instrument(skip(self, call), fields(operation = %call.name))]
    pub async fn invoke(&self, call: &OperationCall) -> OperationResult {
        let request = match LedgerRequest::from_call(&self.catalog, call) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected call arguments");
                return OperationResult::failure(&call.name, e);
            }
        };

        match self.execute(&request).await {
            Ok(payload) => OperationResult::success(&call.name, payload),
            Err(e) => {
                tracing::warn!(error = %e, "Ledger call failed");
                OperationResult::failure(&call.name, e)
            }
        }
    }

    /// Cheap read-only call used to check the ledger is reachable
    pub async fn probe(&self) -> Result<Value, LedgerError> {
        self.execute(&LedgerRequest::FeePercentiles).await
    }

    /// Run a typed request under the retry policy for its kind.
    pub async fn execute(&self, request: &LedgerRequest) -> Result<Value, LedgerError> {
        if !request.is_read_only() {
            return self.post(request).await.map_err(|e| settle_transfer_error(e, self.timeout));
        }

        let mut attempt = 0;
        loop {
            match self.post(request).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.read_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "Retrying read-only ledger call");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post(&self, request: &LedgerRequest) -> Result<Value, LedgerError> {
        let url = format!("{}{}", self.base_url, request.path());

        let mut req_builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(host) = &self.host {
            req_builder = req_builder.header("Host", host);
        }
        if let Some(tp) = current_traceparent() {
            req_builder = req_builder.header("traceparent", tp);
        }

        let response = req_builder
            .json(&request.body())
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status { status, body });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout(self.timeout)
            } else {
                LedgerError::Decode(e)
            }
        })
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout(timeout)
    } else if e.is_connect() {
        LedgerError::Connect(e)
    } else {
        LedgerError::Transport(e)
    }
}

/// A transfer that may have reached the ledger is reported as ambiguous,
/// never as a plain failure the user might blindly repeat.
fn settle_transfer_error(e: LedgerError, timeout: Duration) -> LedgerError {
    match e {
        LedgerError::Timeout(_) => LedgerError::Ambiguous {
            reason: format!("no response within {:?}", timeout),
        },
        LedgerError::Transport(inner) => LedgerError::Ambiguous {
            reason: inner.to_string(),
        },
        // 2xx: the ledger took the transfer, we just cannot read the answer
        LedgerError::Decode(inner) => LedgerError::Ambiguous {
            reason: format!("request accepted but the response was unreadable: {}", inner),
        },
        // The gateway answered, not the canister, which may already have run it
        LedgerError::Status { status, body } if is_gateway_status(status) => {
            LedgerError::Ambiguous {
                reason: format!("gateway returned {}: {}", status, body),
            }
        }
        // Connect failures never reached the ledger; other status errors are its answer
        other => other,
    }
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// W3C traceparent for the current span, when OpenTelemetry is active
fn current_traceparent() -> Option<String> {
    use opentelemetry::trace::TraceContextExt;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let span = tracing::Span::current();
    let context = span.context();
    let ctx_span = context.span();
    let span_context = ctx_span.span_context();

    if span_context.is_valid() {
        let flags = if span_context.is_sampled() { "01" } else { "00" };
        Some(format!(
            "00-{}-{}-{}",
            span_context.trace_id(),
            span_context.span_id(),
            flags
        ))
    } else {
        None
    }
}
