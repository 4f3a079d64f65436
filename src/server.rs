use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::model::{FieldType, Model, Schema};
use crate::routes::{RouteGenerator, WriteEncoding};

/// Where the served models keep their documents
#[derive(Clone)]
pub enum Backend {
    Memory,
    Postgres(PgPool),
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Build a model on this backend
    pub async fn model(&self, name: &str, schema: Schema) -> anyhow::Result<Arc<Model>> {
        let model = match self {
            Backend::Memory => Model::in_memory(name, schema),
            Backend::Postgres(pool) => Model::postgres(name, schema, pool.clone()).await?,
        };
        Ok(Arc::new(model))
    }
}

/// Schema of the `users` collection served by the bundled binary
pub fn users_schema() -> Schema {
    Schema::new()
        .unique_field("username", FieldType::String)
        .field("age", FieldType::Number)
}

/// Assemble the HTTP app: one CRUD router per model under the mount path
pub fn app(config: &AppConfig, backend: Backend, models: &[Arc<Model>]) -> Router {
    let encoding = WriteEncoding::from_flag(config.api.double_encode_writes);
    let mount = config.api.mount_path.trim_end_matches('/');

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health(backend.clone())));

    for model in models {
        let crud = RouteGenerator::new(Router::new(), model.clone())
            .with_encoding(encoding)
            .all_crud();
        let path = format!("{}/{}", mount, model.name());
        tracing::info!(
            "Mounted {} at {}: {}",
            model.name(),
            path,
            crud.registrations()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        router = router.nest(&path, crud.into_router());
    }

    let mut router = router.layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));
    if config.security.enable_cors {
        let origins: Vec<HeaderValue> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
        router = router.layer(cors);
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "autocrud",
            "version": version,
            "description": "Generated REST CRUD routes for schema-bound collections",
            "endpoints": {
                "list": "GET /api/:collection",
                "show": "GET /api/:collection/:_id",
                "create": "POST /api/:collection",
                "update": "PUT /api/:collection/:_id",
                "delete": "DELETE /api/:collection/:_id",
            }
        }
    }))
}

async fn health(backend: Backend) -> Result<Json<Value>, ApiError> {
    let check = match &backend {
        Backend::Memory => Ok(()),
        Backend::Postgres(pool) => DatabaseManager::health_check(pool).await,
    };
    if let Err(e) = check {
        tracing::warn!("Health check failed for {} storage: {}", backend.label(), e);
        return Err(ApiError::service_unavailable(format!("storage unavailable: {}", e)));
    }

    Ok(Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "storage": backend.label()
        }
    })))
}
