//! Wire types for the workflow/execution routes (spec §6.1, §4.4.3).

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
pub struct ExecuteWorkflowBody {
    #[serde(default)]
    pub inputs: Value,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListExecutionsQuery {
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}
