use std::time::Duration;

use async_trait::async_trait;

use crate::decision::types::{ActionDescriptor, DecisionRequest, DecisionResponse};
use crate::errors::{AgentError, AgentResult};

/// Seam for the remote decision service. The engine only ever sees the raw
/// response body; decoding is a separate step so a malformed body can still
/// be archived to history.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> AgentResult<String>;
}

pub struct HttpDecisionClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDecisionClient {
    pub fn new(endpoint: String, timeout: Duration) -> AgentResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl DecisionService for HttpDecisionClient {
    async fn decide(&self, request: &DecisionRequest) -> AgentResult<String> {
        tracing::debug!(
            endpoint = %self.endpoint,
            task = %request.task,
            image_len = request.image.len(),
            history_len = request.history.len(),
            "sending decision request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .header("Content-Type", "application/json; charset=utf-8")
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AgentError::Transport(format!("{status}: {body}")));
        }

        tracing::debug!(status = %status, body_len = body.len(), "decision response received");
        Ok(body)
    }
}

/// Decodes a raw response body into `{reasoning, action, parameters}`.
pub fn decode_decision(raw: &str) -> AgentResult<DecisionResponse> {
    serde_json::from_str::<DecisionResponse>(raw).map_err(|e| AgentError::Decode(e.to_string()))
}

/// Convenience: decode and immediately build the one-shot descriptor.
pub fn decode_action(raw: &str) -> AgentResult<(DecisionResponse, ActionDescriptor)> {
    let response = decode_decision(raw)?;
    let descriptor = ActionDescriptor::from_response(&response);
    Ok((response, descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::ActionKind;

    #[test]
    fn decode_valid_body() {
        let raw = r#"{"reasoning":"open the target app","action":"open_app","parameters":{"package_name":"com.example.app"}}"#;
        let (response, descriptor) = decode_action(raw).expect("valid body decodes");
        assert_eq!(response.reasoning, "open the target app");
        assert_eq!(descriptor.kind, ActionKind::OpenApp);
        assert_eq!(descriptor.param_str("package_name"), Some("com.example.app"));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_decision("not json at all").unwrap_err();
        assert!(matches!(err, AgentError::Decode(_)));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let response = decode_decision("{}").expect("empty object decodes");
        assert!(response.reasoning.is_empty());
        let descriptor = ActionDescriptor::from_response(&response);
        assert_eq!(descriptor.kind, ActionKind::Unknown);
    }
}
