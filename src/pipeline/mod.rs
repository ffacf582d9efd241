//! The `/v1/logs` ingestion and forwarding pipeline.
//!
//! [`logs_handler`] is the single write endpoint. The operating mode was
//! fixed at startup: in Ingest mode a request is decoded, validated
//! eagerly, given an identity, enriched, routed per application, and
//! written to the store under the circuit breaker; in Forward mode the
//! raw body is proxied upstream with a whitelisted header set and the
//! decoder/validator/auth stages are skipped entirely. Submodules
//! handle identity resolution ([`auth`]), record handling ([`record`]),
//! and index routing ([`router`]).

pub mod auth;
pub mod record;
pub mod router;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::{ForwardConfig, Mode, StoreConfig};
use crate::error::CollectorError;
use crate::forward::{self, ForwardOutcome};
use crate::server::AppState;
use crate::store::{self, IndexedDocument};

use router::IndexRouter;

/// Wire shape of every successful `/v1/logs` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedBody {
    pub status: String,
    pub ingested: usize,
}

fn accepted(ingested: usize) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(AcceptedBody {
            status: "accepted".to_string(),
            ingested,
        }),
    )
        .into_response()
}

pub async fn logs_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    match state.config.mode {
        Mode::Unconfigured => {
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(request_id = %request_id, "request received but collector is not configured");
            CollectorError::NotConfigured.into_response()
        }
        Mode::Forward(ref forward) => {
            forward_logs(&state, forward, &request_id, &headers, body).await
        }
        Mode::Ingest {
            ref store,
            ref routes,
        } => ingest_logs(&state, store, routes, &request_id, addr, &headers, &body).await,
    }
}

async fn forward_logs(
    state: &AppState,
    config: &ForwardConfig,
    request_id: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let Some(permit) = state.breaker.allow_request() else {
        state.stats.rejected.fetch_add(1, Ordering::Relaxed);
        if state.breaker.should_emit_diagnostic() {
            tracing::warn!(request_id = %request_id, "upstream paused after failures, rejecting forward");
        }
        return CollectorError::Forward {
            message: "upstream writes are paused after repeated failures".into(),
        }
        .into_response();
    };

    match forward::forward_request(&state.http_client, config, headers, body).await {
        Ok(ForwardOutcome::Accepted { body }) => {
            permit.success();
            state.stats.accepted.fetch_add(1, Ordering::Relaxed);
            tracing::info!(request_id = %request_id, "forwarded to upstream");
            (
                StatusCode::ACCEPTED,
                [("content-type", "application/json")],
                body,
            )
                .into_response()
        }
        Ok(ForwardOutcome::Rejected { status, body }) => {
            // Upstream contact succeeded; the caller's payload was the problem
            permit.success();
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::info!(request_id = %request_id, status = status.as_u16(), "upstream rejected payload");
            (status, [("content-type", "application/json")], body).into_response()
        }
        Err(err) => {
            permit.failure(&err);
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(request_id = %request_id, error = %err, "forward failed");
            err.into_response()
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn ingest_logs(
    state: &AppState,
    store_config: &StoreConfig,
    routes: &IndexRouter,
    request_id: &str,
    addr: SocketAddr,
    headers: &HeaderMap,
    body: &Bytes,
) -> Response {
    let (validated, identity) = match prepare_records(state, headers, body) {
        Ok(parts) => parts,
        Err(err) => {
            state.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::info!(request_id = %request_id, error = %err, "request rejected");
            return err.into_response();
        }
    };

    let count = validated.len();
    if count == 0 {
        return accepted(0);
    }

    let enrichment = record::Enrichment::now(client_ip(headers, addr));
    let documents: Vec<IndexedDocument> = validated
        .into_iter()
        .map(|record| IndexedDocument {
            index: routes.resolve(record.application()).to_string(),
            doc: record.enrich(&enrichment, &identity),
        })
        .collect();

    let Some(permit) = state.breaker.allow_request() else {
        if state.breaker.should_emit_diagnostic() {
            tracing::warn!(request_id = %request_id, records = count, "store paused after failures, dropping records");
        }
        return store_failure_response(state, count, CollectorError::Connection {
            message: "store writes are paused after repeated failures".into(),
        });
    };

    match store::write_documents(&state.http_client, store_config, &documents).await {
        Ok(()) => {
            permit.success();
            state.stats.accepted.fetch_add(count as u64, Ordering::Relaxed);
            tracing::info!(request_id = %request_id, records = count, "records ingested");
            accepted(count)
        }
        Err(err) => {
            permit.failure(&err);
            store_failure_response(state, count, err)
        }
    }
}

/// Decode, resolve identity, and validate — everything that happens
/// synchronously before any I/O. Auth and validation failures surface
/// here, verbatim, before a single byte goes downstream.
fn prepare_records(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(Vec<record::ValidatedRecord>, auth::Identity), CollectorError> {
    let payload = record::decode_payload(body)?;

    let token = auth::extract_token(headers);
    let identity = auth::resolve_identity(
        state.config.auth_mode,
        token.as_deref(),
        &state.config.tokens,
        payload.identity.as_ref(),
    )?;

    let validated = record::validate_records(payload.records)?;
    Ok((validated, identity))
}

/// With suppression on (the default) a store failure still answers
/// accepted and the records count as dropped; with suppression off the
/// error kind is surfaced to the caller.
fn store_failure_response(state: &AppState, count: usize, err: CollectorError) -> Response {
    if state.config.suppress_store_failures {
        state.stats.dropped.fetch_add(count as u64, Ordering::Relaxed);
        accepted(count)
    } else {
        state.stats.rejected.fetch_add(1, Ordering::Relaxed);
        err.into_response()
    }
}

/// Client IP precedence: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    addr.ip().to_string()
}
