pub mod rabbitmq;

use async_trait::async_trait;

use crate::modules::conversion::events::ConversionJob;

pub const CONVERSION_QUEUE: &str = "conversion_jobs";

/// Hands a job to whatever runs the orchestrator.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &ConversionJob) -> anyhow::Result<()>;
}
