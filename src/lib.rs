//! Devlogs collector: an HTTP front door for structured application logs.
//!
//! Applications POST log records to `/v1/logs`. Depending on startup
//! configuration the collector either proxies them unmodified to an
//! upstream collector (forward mode) or validates, enriches, and writes
//! them to an OpenSearch-compatible document store (ingest mode). A
//! circuit breaker guards the downstream write path in both modes.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, health).
//! - [`config`] -- Startup-only configuration: mode resolution, token
//!   map, and index routing tables.
//! - [`error`] -- Unified error types using `thiserror`, mapped to the
//!   `{code, subcode, message}` response contract.
//! - [`breaker`] -- Circuit breaker shared by all in-flight requests.
//! - [`health`] -- `GET /health` endpoint handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty output.
//! - [`pipeline`] -- The `/v1/logs` pipeline: decoding, validation,
//!   identity resolution, enrichment, and index routing.
//! - [`store`] -- Document and bulk writes to the store.
//! - [`forward`] -- Transparent proxying to an upstream collector.
//! - [`server`] -- Axum server setup, shared application state, HTTP
//!   client, and graceful shutdown.

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod breaker;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod forward;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod store;
