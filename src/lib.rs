pub mod config;
pub mod db;
pub mod lesson;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::services::blob_storage::{BlobBackend, BlobConfig, BlobStorage};
use crate::services::lesson_store::LessonStore;
use crate::services::pipeline::LessonPipeline;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Database(#[from] db::SqliteInitError),
    #[error(transparent)]
    Blob(#[from] services::blob_storage::BlobError),
}

/// Wires config, storage and providers from the environment into a router.
pub async fn create_app(config: Config) -> Result<axum::Router, StartupError> {
    let blob_config = BlobConfig::from_env();
    let blobs = blob_config.build()?;
    let pool = db::init_sqlite_pool(&config.db_path).await?;
    let media_dir = (blob_config.backend == BlobBackend::Local).then(|| blob_config.dir.clone());

    Ok(build_app(config, pool, blobs, LessonPipeline::from_env(), media_dir))
}

pub fn build_app(
    config: Config,
    pool: sqlx::SqlitePool,
    blobs: Arc<dyn BlobStorage>,
    pipeline: LessonPipeline,
    media_dir: Option<std::path::PathBuf>,
) -> axum::Router {
    let store = LessonStore::new(pool, Arc::clone(&blobs));
    let state = AppState::new(config, store, blobs, pipeline);

    routes::router(state, media_dir)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
