use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use atlas_api::database::manager::DatabaseManager;
use atlas_api::handlers::{auth as auth_handlers, resource};
use atlas_api::middleware::jwt_auth_middleware;
use atlas_api::schema::registry;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = atlas_api::config::config();
    tracing::info!("starting atlas-api in {:?} mode", config.environment);

    let app = app();

    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("atlas-api listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_auth_routes())
        // Protected API behind JWT middleware
        .merge(api_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn public_auth_routes() -> Router {
    Router::new()
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/refresh", post(auth_handlers::refresh_session))
}

fn api_routes() -> Router {
    Router::new()
        .route("/api/auth/whoami", get(auth_handlers::whoami))
        // Generic entity resources
        .route("/api/:entity", post(resource::post_item))
        .route("/api/:entity/search", get(resource::search))
        .route("/api/:entity/find", post(resource::find))
        .route("/api/:entity/:id", get(resource::get_item).patch(resource::patch_item))
        .layer(axum_middleware::from_fn(jwt_auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Atlas API",
            "version": version,
            "description": "Schema-driven CRUD REST backend with a generic partial-update engine",
            "entities": registry().names(),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/login, /auth/refresh (public - token acquisition)",
                "whoami": "/api/auth/whoami (protected)",
                "resources": "/api/:entity, /api/:entity/:id, /api/:entity/search, /api/:entity/find (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
