use serde::Serialize;

use crate::domain::status::PipelineStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: PipelineStatus,
}
