//! dog-blobstore-server: HTTP front end for `dog-blobstore`.
//!
//! Routes live under `/v1/blob` and map one-to-one onto the adapter's put,
//! get, list and delete operations.

mod error;
pub mod routes;
pub mod settings;

pub use error::BlobApiError;
pub use routes::AppState;
pub use settings::{BackendKind, Settings};

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use dog_blobstore::{
    BlobAdapter, BlobConfig, FsStore, MemoryStore, S3CompatibleStore,
};
use tower_http::trace::TraceLayer;

/// Build the adapter for the configured backend
pub async fn build_adapter(settings: &Settings) -> anyhow::Result<BlobAdapter> {
    let rules = settings.upload_rules.clone();
    let config = BlobConfig::new().with_upload_rules(rules.clone());

    let adapter = match settings.backend {
        BackendKind::Memory => BlobAdapter::new(
            MemoryStore::new().with_min_part_size(rules.min_multipart_size),
            config,
        )?,
        BackendKind::Fs => BlobAdapter::new(FsStore::new(&settings.root), config)?,
        BackendKind::S3 => BlobAdapter::new(S3CompatibleStore::from_env().await?, config)?,
    };

    tracing::info!(
        backend = adapter.backend_name(),
        bucket = %settings.bucket,
        part_size = rules.part_size,
        min_multipart_size = rules.min_multipart_size,
        part_concurrency = rules.part_concurrency,
        "blob adapter ready"
    );
    Ok(adapter)
}

/// Routes over an already built state
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/blob", get(routes::list).post(routes::upload_form))
        .route(
            "/v1/blob/{*key}",
            get(routes::download)
                .put(routes::upload_raw)
                .delete(routes::remove),
        )
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the full application from settings
pub async fn build(settings: &Settings) -> anyhow::Result<Router> {
    let adapter = build_adapter(settings).await?;
    let state = AppState::new(adapter, settings.bucket.clone());
    Ok(router(state, settings.max_body_bytes))
}
