use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::Config;
use crate::services::blob_storage::BlobStorage;
use crate::services::lesson_store::LessonStore;
use crate::services::pipeline::LessonPipeline;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    store: LessonStore,
    blobs: Arc<dyn BlobStorage>,
    pipeline: Arc<LessonPipeline>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: LessonStore,
        blobs: Arc<dyn BlobStorage>,
        pipeline: LessonPipeline,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            store,
            blobs,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LessonStore {
        &self.store
    }

    pub fn blobs(&self) -> Arc<dyn BlobStorage> {
        Arc::clone(&self.blobs)
    }

    pub fn pipeline(&self) -> Arc<LessonPipeline> {
        Arc::clone(&self.pipeline)
    }
}
