//! Pipeline lifecycle status (spec §4.5 "logs a status line in every path
//! (enabled/running, disabled, failed)"), surfaced on the health endpoint.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Disabled,
    Running,
    Failed,
}
