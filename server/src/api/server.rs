//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::routes::cluster::{self, MergeState};
use super::routes::health;
use super::routes::segments::{self, IngestState};
use crate::core::CoreApp;
use crate::core::constants::{DEFAULT_BODY_LIMIT, SEGMENT_BODY_LIMIT};

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        // Clone shutdown before moving app
        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let ingest_routes = Router::new()
            .route("/v1/segments", post(segments::ingest))
            .with_state(IngestState {
                intake: Arc::clone(&app.intake),
                watermark: Arc::clone(&app.watermark),
            })
            .layer(DefaultBodyLimit::max(SEGMENT_BODY_LIMIT));

        let merge_routes = Router::new()
            .route("/v1/cluster/merge", post(cluster::merge))
            .with_state(MergeState {
                shards: Arc::clone(&app.shards),
                watermark: Arc::clone(&app.watermark),
            });

        let nodes_routes = Router::new()
            .route("/v1/cluster/nodes", get(cluster::nodes))
            .with_state(Arc::clone(&app.cluster));

        let router = Router::new()
            .route("/health", get(health::health))
            .merge(ingest_routes)
            .merge(merge_routes)
            .merge(nodes_routes)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT));

        tracing::debug!(addr = %addr, "API server listening");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}
