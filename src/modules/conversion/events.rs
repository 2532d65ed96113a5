use serde::{Deserialize, Serialize};

/// Queue message asking a worker to run one conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    pub job_id: String,
}
