//! Forward-mode writer: transparent proxying to an upstream collector.
//!
//! The inbound body is passed through byte-for-byte — no decoding, no
//! validation, no enrichment — and only a fixed whitelist of headers
//! travels with it. The upstream implements the same `/v1/logs`
//! contract, so its 2xx body is relayed under our own 202 and its
//! 400/401 validation and auth responses go back to the caller
//! verbatim. Anything else is a downstream failure for the breaker.

use axum::http::HeaderMap;
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::StatusCode;

use crate::config::ForwardConfig;
use crate::error::CollectorError;
use crate::server::HttpClient;

const FORWARDED_HEADERS: [&str; 3] = ["content-type", "authorization", "x-request-id"];

/// What the upstream said, when it could be reached at all.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Upstream 2xx; relay its body under our accepted status.
    Accepted { body: Bytes },
    /// Upstream 400/401 — an expected validation or auth response on
    /// the shared contract, relayed verbatim. Not a breaker failure.
    Rejected { status: StatusCode, body: Bytes },
}

pub async fn forward_request(
    client: &HttpClient,
    config: &ForwardConfig,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ForwardOutcome, CollectorError> {
    let mut builder = hyper::Request::builder()
        .method(hyper::Method::POST)
        .uri(config.endpoint());

    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name) {
            builder = builder.header(name, value);
        }
    }

    let request = builder
        .body(Full::new(body))
        .map_err(|e| CollectorError::Forward { message: e.to_string() })?;

    // One timeout over request and body read; an upstream that answers
    // headers and then stalls the body cannot hold the handler
    let call = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| CollectorError::Forward { message: e.to_string() })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map(http_body_util::Collected::to_bytes)
            .map_err(|e| CollectorError::Forward {
                message: format!("upstream body read failed: {e}"),
            })?;
        Ok::<_, CollectorError>((status, body))
    };

    let (status, body) = tokio::time::timeout(config.timeout, call)
        .await
        .map_err(|_| CollectorError::Forward {
            message: format!("upstream timed out after {}s", config.timeout.as_secs()),
        })??;

    if status.is_success() {
        Ok(ForwardOutcome::Accepted { body })
    } else if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
        Ok(ForwardOutcome::Rejected { status, body })
    } else {
        Err(CollectorError::Forward {
            message: format!("upstream returned {status}"),
        })
    }
}
