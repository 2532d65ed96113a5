use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::documents::PgDocumentStore;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::ffmpeg::FfmpegTranscoder;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::conversion::orchestrator::JobOrchestrator;
use crate::modules::conversion::repository::MediaRepository;
use crate::modules::conversion::service::ConversionService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub redis: RedisService,
    pub queue: RabbitMqService,
    pub conversions: Arc<ConversionService>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        redis: RedisService,
        queue: RabbitMqService,
        storage: StorageService,
    ) -> Self {
        let media = MediaRepository::new(Arc::new(PgDocumentStore::new(db)));
        let storage = Arc::new(storage);
        let transcoder = Arc::new(FfmpegTranscoder::new(&config.video));

        let conversions = ConversionService::new(
            media.clone(),
            storage.clone(),
            Arc::new(queue.clone()),
            config.video.max_retries,
        );
        let orchestrator = JobOrchestrator::new(media, storage, transcoder, &config.video);

        Self {
            config,
            redis,
            queue,
            conversions: Arc::new(conversions),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
