use crate::config::{CityConfig, StoreBackend};
use crate::handlers;
use crate::services::{
    ensure_collection, DocumentStore, ElasticsearchStore, InMemoryStore, PopulationService,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, request_span};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub population: Arc<PopulationService>,
}

impl AppState {
    pub fn new(population: PopulationService) -> Self {
        Self {
            population: Arc::new(population),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/city", post(handlers::upsert_city))
        .route("/population/:city", get(handlers::get_population))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Builds the store selected by configuration.
pub fn build_store(config: &CityConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Elasticsearch => Arc::new(
            ElasticsearchStore::new(&config.elasticsearch)
                .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(store)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    /// Creates the collection if needed, then binds the listener.
    ///
    /// Fails if the collection cannot be checked or created.
    pub async fn build(config: CityConfig) -> Result<Self, AppError> {
        let store = build_store(&config)?;
        Self::build_with_store(config, store).await
    }

    pub async fn build_with_store(
        config: CityConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, AppError> {
        let collection = config.elasticsearch.index.clone();

        ensure_collection(store.as_ref(), &collection)
            .await
            .map_err(|e| {
                tracing::error!(collection = %collection, error = %e, "Failed to bootstrap collection");
                AppError::InternalError(anyhow::Error::new(e))
            })?;

        let population = PopulationService::new(store, collection, config.upsert_mode);
        let state = AppState::new(population);

        let app = build_router(state);

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            upsert_mode = ?config.upsert_mode,
            "Listening"
        );

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
