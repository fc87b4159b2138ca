#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use city_service::config::{
    CityConfig, ElasticsearchConfig, StoreBackend, StoreConfig, UpsertMode,
};
use city_service::services::{InMemoryStore, PopulationService};
use city_service::{build_router, AppState, Application};
use serde_json::Value;
use service_core::config::Config as CoreConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const COLLECTION: &str = "cities";

/// Router wired to an in-memory store, driven with `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mode(UpsertMode::BestEffort)
    }

    pub fn with_mode(mode: UpsertMode) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let population = PopulationService::new(store.clone(), COLLECTION, mode);
        let router = build_router(AppState::new(population));
        Self { router, store }
    }

    pub async fn post_city(&self, payload: Value) -> (StatusCode, Value) {
        self.post_city_raw(payload.to_string()).await
    }

    pub async fn post_city_raw(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/city")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        self.send_json(request).await
    }

    pub async fn get_population(&self, city: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(format!("/population/{}", city))
            .body(Body::empty())
            .unwrap();
        self.send_json(request).await
    }

    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }
}

pub fn test_config(mode: UpsertMode) -> CityConfig {
    CityConfig {
        common: CoreConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0, // Random port for testing
        },
        service_name: "city-service-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreConfig {
            backend: StoreBackend::Memory,
        },
        elasticsearch: ElasticsearchConfig {
            url: "http://localhost:9200".to_string(),
            index: COLLECTION.to_string(),
            username: None,
            password: None,
        },
        upsert_mode: mode,
    }
}

/// Application bound to a random local port, served in the background.
pub struct SpawnedApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
}

impl SpawnedApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let app = Application::build_with_store(test_config(UpsertMode::BestEffort), store.clone())
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept connections
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self { address, store }
    }
}
