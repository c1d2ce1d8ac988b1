//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpAgentClient, LocalObjectStorage, PgChangeFeed},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use learning_space_core::gateway::{RemoteActionGateway, UploadPolicy};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Config & tracing ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(agent_configured = config.agent_api.is_some(), "Learning spaces service configured");

    // --- 2. Database ---
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = DbAdapter::new(db_pool);
    db_adapter.run_migrations().await?;
    info!("learning_space schema is up to date");

    // --- 3. Adapters & gateway ---
    if config.agent_api.is_none() {
        warn!("AGENT_API is not set; content generation will fail until it is configured");
    }
    let agent = Arc::new(HttpAgentClient::new(
        reqwest::Client::new(),
        config.agent_api.clone(),
    ));
    tokio::fs::create_dir_all(&config.storage_root)
        .await
        .map_err(|source| ApiError::StorageRoot {
            path: config.storage_root.clone(),
            source,
        })?;
    let storage = Arc::new(LocalObjectStorage::new(
        config.storage_root.clone(),
        config.storage_public_url.clone(),
    ));
    let change_feed = Arc::new(PgChangeFeed::new(
        db_adapter.clone(),
        config.realtime_subscribe_timeout,
    ));
    let gateway = Arc::new(RemoteActionGateway::new(
        Arc::new(db_adapter),
        agent,
        storage,
        UploadPolicy {
            max_bytes: config.max_upload_bytes,
        },
    ));

    // --- 4. Shared state & CORS ---
    let app_state = Arc::new(AppState {
        gateway,
        change_feed,
        config: config.clone(),
    });

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Cors {
            origin: config.cors_origin.clone(),
            reason: e.to_string(),
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 5. Routes ---
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Serve ---
    info!(address = %config.bind_address, "Listening; API docs at /swagger-ui");
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
