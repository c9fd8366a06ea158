use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::NluConfig;
use crate::error::{EngineError, Result};

use super::{Classification, NluService};

/// Intent/slot classifier backed by a Dialogflow-style query endpoint.
///
/// Accepts both the v1 envelope (`result.metadata.intentName`,
/// `result.parameters`) and a flat `{intent, parameters}` body.
pub struct DialogflowClient {
    client: Client,
    name: String,
    endpoint: String,
    language: String,
    access_token: Option<String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    lang: &'a str,
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<QueryResult>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    metadata: Option<QueryMetadata>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

#[derive(Deserialize)]
struct QueryMetadata {
    #[serde(default, rename = "intentName")]
    intent_name: String,
}

impl QueryResponse {
    fn into_classification(self) -> Classification {
        match self.result {
            Some(result) => Classification {
                intent: result.metadata.map(|m| m.intent_name).unwrap_or_default(),
                parameters: result.parameters,
            },
            None => Classification {
                intent: self.intent.unwrap_or_default(),
                parameters: self.parameters.unwrap_or_default(),
            },
        }
    }
}

impl DialogflowClient {
    pub fn new(config: &NluConfig, access_token: Option<String>) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(EngineError::Config("nlu.endpoint is required when nlu is enabled".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to create HTTP client: {e}")))?;

        info!(
            service = %config.service,
            endpoint = %config.endpoint,
            language = %config.language,
            "NLU client initialized"
        );

        Ok(Self {
            client,
            name: config.service.clone(),
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
            access_token,
        })
    }
}

#[async_trait::async_trait]
impl NluService for DialogflowClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, text: &str) -> Result<Classification> {
        let body = QueryRequest {
            query: text,
            lang: &self.language,
            session_id: uuid::Uuid::new_v4().to_string(),
        };

        debug!(service = %self.name, len = text.len(), "querying NLU");

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref token) = self.access_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EngineError::upstream(&self.name, format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            warn!(service = %self.name, status = %status, "NLU query error");
            return Err(EngineError::upstream(
                &self.name,
                format!("returned {status}: {error_text}"),
            ));
        }

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::upstream(&self.name, format!("bad response: {e}")))?;

        Ok(parsed.into_classification())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_envelope_is_reduced() {
        let resp: QueryResponse = serde_json::from_value(json!({
            "result": {
                "metadata": {"intentName": "order-pizza"},
                "parameters": {"pizza": "マリナーラ"}
            }
        }))
        .unwrap();
        let c = resp.into_classification();
        assert_eq!(c.intent, "order-pizza");
        assert_eq!(c.slot("pizza"), Some(&json!("マリナーラ")));
    }

    #[test]
    fn flat_body_is_accepted() {
        let resp: QueryResponse =
            serde_json::from_value(json!({"intent": "yes_no", "parameters": {"yes_no": "はい"}})).unwrap();
        let c = resp.into_classification();
        assert_eq!(c.intent, "yes_no");
        assert_eq!(c.slot("yes_no"), Some(&json!("はい")));
    }

    #[test]
    fn empty_body_classifies_as_nothing() {
        let resp: QueryResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.into_classification(), Classification::default());
    }

    #[test]
    fn missing_endpoint_is_config_error() {
        let cfg = NluConfig::default();
        assert!(matches!(DialogflowClient::new(&cfg, None), Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_upstream_error() {
        let cfg = NluConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:9/query".into(),
            timeout_secs: 1,
            ..NluConfig::default()
        };
        let client = DialogflowClient::new(&cfg, None).unwrap();
        let err = client.classify("hello").await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream { .. }));
    }
}
