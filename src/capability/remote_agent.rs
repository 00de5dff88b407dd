//! Remote HTTP agent.
//!
//! Evaluates an agent that lives behind an HTTP endpoint: the full
//! [`AgentContext`] is POSTed as JSON and the endpoint answers with the
//! predicted command. This is how externally-hosted agents plug into a
//! replay without linking against this crate.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::agent::{Agent, AgentContext, Prediction};
use super::error::{AgentError, AgentResult};

/// Agent that forwards prediction requests to an HTTP endpoint.
///
/// Expected contract: `POST <endpoint>` with body `{"context": {...}}`,
/// answered by `{"command": "...", "rationale": "..."}` where `rationale`
/// is optional.
pub struct RemoteAgent {
    endpoint: String,
    timeout: Duration,
    http_client: Client,
}

impl RemoteAgent {
    /// Create a remote agent for the given endpoint.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// The endpoint URL this agent talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    context: &'a AgentContext,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    command: String,
    #[serde(default)]
    rationale: Option<String>,
}

#[async_trait]
impl Agent for RemoteAgent {
    fn name(&self) -> &str {
        "remote"
    }

    async fn predict(&self, context: &AgentContext) -> AgentResult<Prediction> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&PredictRequest { context })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    AgentError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Unavailable(format!(
                "agent endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Unavailable(format!("unparseable agent response: {}", e)))?;

        if body.command.trim().is_empty() {
            return Err(AgentError::Unavailable(
                "agent returned an empty command".to_string(),
            ));
        }

        let mut prediction = Prediction::new(body.command.trim());
        if let Some(rationale) = body.rationale {
            prediction = prediction.with_rationale(rationale);
        }
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> AgentContext {
        AgentContext {
            challenge: "FUNBOX".to_string(),
            step_index: 0,
            description: "Scan the target".to_string(),
            prior_commands: vec![],
            rejected: vec![],
        }
    }

    #[test]
    fn test_request_body_wraps_context() {
        let ctx = context();
        let body = serde_json::to_value(PredictRequest { context: &ctx }).unwrap();
        assert_eq!(body["context"]["challenge"], "FUNBOX");
        assert_eq!(body["context"]["step_index"], 0);
    }

    #[test]
    fn test_response_rationale_is_optional() {
        let body: PredictResponse =
            serde_json::from_str(r#"{"command": "nmap -sV 10.0.0.1"}"#).unwrap();
        assert_eq!(body.command, "nmap -sV 10.0.0.1");
        assert!(body.rationale.is_none());
    }

    #[tokio::test]
    async fn test_predict_connection_error() {
        let agent = RemoteAgent::new("http://localhost:65535/predict", Duration::from_secs(5));
        let err = agent.predict(&context()).await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }
}
