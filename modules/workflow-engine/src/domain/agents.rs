//! Agent registry (spec §4.4.1): runnable units with signature
//! `invoke(inputs, config) -> outputs`. New behavior is expressed by new
//! metadata, not new code — `DynamicAgent` and `DataAggregatorAgent` are
//! the only first-class variants.

use std::time::Duration;

use async_trait::async_trait;
use modkit_errors::ApiError;
use serde_json::{Map, Value};

use super::safe_eval;

/// Shared runtime handed to every agent invocation: the HTTP client used to
/// reach the external AI/embedding services and per-call configuration the
/// agent doesn't own (spec §1 Non-goals: "LLM selection policy" is out of
/// scope, so the runtime only supplies *how* to call out, not *which*
/// model to prefer for a task — that choice lives in the agent's own
/// metadata).
#[derive(Clone)]
pub struct AgentRuntime {
    pub http: reqwest::Client,
    pub ai_service_url: String,
    pub ai_service_api_key: String,
    pub call_timeout: Duration,
}

impl AgentRuntime {
    #[must_use]
    pub fn new(ai_service_url: impl Into<String>, ai_service_api_key: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            ai_service_url: ai_service_url.into(),
            ai_service_api_key: ai_service_api_key.into(),
            call_timeout,
        }
    }
}

/// A runnable unit in the compiled graph (spec §4.4.1).
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, inputs: &Value, runtime: &AgentRuntime) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DynamicAgentConfig {
    prompt: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
}

fn default_model() -> String {
    "default".to_owned()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}

/// Delegates to an external AI service and parses a structured JSON reply
/// (spec §4.4.1 "DynamicAgent"). The source's text-fallback grammar is an
/// unresolved Open Question (spec §9); this engine freezes the decision as
/// JSON-only (recorded in `DESIGN.md`) — any non-JSON reply is an
/// `ApiError::external`, since a malformed upstream response is the
/// upstream's fault, not the caller's.
pub struct DynamicAgent {
    config: DynamicAgentConfig,
}

impl DynamicAgent {
    /// # Errors
    /// `ApiError::validation` if `agent_config` doesn't match
    /// `{prompt, model?, reasoning?, temperature?, maxTokens?}`.
    pub fn new(agent_config: &Value) -> Result<Self, ApiError> {
        let config: DynamicAgentConfig =
            serde_json::from_value(agent_config.clone()).map_err(|e| ApiError::validation(format!("invalid DynamicAgent config: {e}")))?;
        Ok(Self { config })
    }

    fn render_prompt(&self, inputs: &Value) -> String {
        format!("{}\n\ninputs: {inputs}", self.config.prompt)
    }
}

#[async_trait]
impl Agent for DynamicAgent {
    async fn invoke(&self, inputs: &Value, runtime: &AgentRuntime) -> Result<Value, ApiError> {
        let prompt = self.render_prompt(inputs);
        let request = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "temperature": self.config.temperature,
            "maxTokens": self.config.max_tokens,
            "reasoning": self.config.reasoning,
        });

        let response = runtime
            .http
            .post(format!("{}/v1/complete", runtime.ai_service_url))
            .bearer_auth(&runtime.ai_service_api_key)
            .timeout(runtime.call_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::external(format!("AI service call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::external(format!("AI service returned status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("AI service reply is not valid JSON: {e}")))?;

        let content = body
            .get("content")
            .ok_or_else(|| ApiError::external("AI service reply missing 'content' field"))?;

        // The reply's `content` is itself either a JSON value or a raw
        // string a caller expects to be JSON; try to parse the latter so
        // agents downstream always see structured data.
        match content {
            Value::String(s) => serde_json::from_str(s).or_else(|_| Ok(Value::String(s.clone()))),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct AggregationField {
    /// Name the computed value is written under in the agent's output.
    name: String,
    /// A safe-evaluator formula (spec §9); referenced prior outputs are
    /// substituted in as numeric literals before evaluation (see
    /// [`DataAggregatorAgent::invoke`]).
    formula: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct DataAggregatorConfig {
    fields: Vec<AggregationField>,
}

/// Aggregates data from prior agent outputs per a declarative spec;
/// formulas are evaluated by the safe expression evaluator (spec §4.4.1
/// "DataAggregatorAgent", §9).
pub struct DataAggregatorAgent {
    config: DataAggregatorConfig,
}

impl DataAggregatorAgent {
    /// # Errors
    /// `ApiError::validation` if `agent_config` doesn't match
    /// `{fields: [{name, formula}]}`.
    pub fn new(agent_config: &Value) -> Result<Self, ApiError> {
        let config: DataAggregatorConfig =
            serde_json::from_value(agent_config.clone()).map_err(|e| ApiError::validation(format!("invalid DataAggregatorAgent config: {e}")))?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Agent for DataAggregatorAgent {
    async fn invoke(&self, inputs: &Value, _runtime: &AgentRuntime) -> Result<Value, ApiError> {
        let mut out = Map::new();
        for field in &self.config.fields {
            let bound = safe_eval::bind(&field.formula, inputs);
            let value = safe_eval::evaluate(&bound)?;
            out.insert(field.name.clone(), Value::from(value));
        }
        Ok(Value::Object(out))
    }
}

/// `AgentRegistry::create` (spec §4.4.1 "single factory").
///
/// # Errors
/// `ApiError::validation` for an unknown `agent_type` or malformed
/// `agent_config`.
pub fn create(agent_type: &str, agent_config: &Value) -> Result<Box<dyn Agent>, ApiError> {
    match agent_type {
        "dynamic" => Ok(Box::new(DynamicAgent::new(agent_config)?)),
        "data_aggregator" => Ok(Box::new(DataAggregatorAgent::new(agent_config)?)),
        other => Err(ApiError::validation(format!("unknown agent type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_aggregator_sums_prior_outputs() {
        let config = serde_json::json!({
            "fields": [{"name": "total", "formula": "{values.sum}"}]
        });
        let agent = DataAggregatorAgent::new(&config).expect("valid config");
        let inputs = serde_json::json!({"values": [10, 20]});
        let runtime = AgentRuntime::new("http://ai.example", "key", Duration::from_secs(1));
        let output = agent.invoke(&inputs, &runtime).await.expect("invokes");
        assert_eq!(output.get("total").and_then(serde_json::Value::as_f64), Some(30.0));
    }

    #[test]
    fn unknown_agent_type_is_rejected() {
        let err = create("not-a-real-agent", &Value::Null).unwrap_err();
        assert_eq!(err.kind, modkit_errors::ErrorKind::Validation);
    }

    #[test]
    fn dynamic_agent_requires_a_prompt() {
        let err = DynamicAgent::new(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, modkit_errors::ErrorKind::Validation);
    }
}
