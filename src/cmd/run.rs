//! `devlogs-collector run` — start the collector server.
//!
//! Resolves the operating mode from flags / environment once, builds
//! the shared state, and serves the Axum router with graceful
//! shutdown. An unconfigured collector still starts and serves
//! `/health`; its write endpoint answers 503 until it is configured
//! and restarted.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::{CollectorConfig, Mode};
use crate::error::CollectorError;
use crate::logging;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), CollectorError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = CollectorConfig::from_args(&args)?;

    match config.mode {
        Mode::Forward(ref forward) => {
            tracing::info!(upstream = %forward.endpoint(), "forward mode");
        }
        Mode::Ingest {
            ref store,
            ref routes,
        } => {
            tracing::info!(
                store = %store.base_url(),
                default_index = routes.default_index(),
                mapped_applications = routes.mapped_applications(),
                "ingest mode"
            );
        }
        Mode::Unconfigured => {
            tracing::warn!(
                "no forward or ingest configuration found; /v1/logs will answer 503 until configured"
            );
        }
    }

    let mode = config.mode.name();
    let state = Arc::new(AppState::new(config));
    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, mode, "devlogs-collector started");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("devlogs-collector stopped");
    Ok(())
}
