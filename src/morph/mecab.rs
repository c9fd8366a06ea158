use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::config::MorphConfig;
use crate::error::{EngineError, Result};

use super::{MorphAnalyzer, Token};

/// Client for a MeCab-as-a-service endpoint.
///
/// The service answers `POST {"sentence": ...}` with an array of rows,
/// each row being `[surface, pos, sub1, sub2, ...]`.
pub struct MecabServiceClient {
    client: Client,
    endpoint: String,
}

impl MecabServiceClient {
    pub fn new(config: &MorphConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(EngineError::Config("morph.endpoint is required when morph is enabled".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to create HTTP client: {e}")))?;
        info!(endpoint = %config.endpoint, "morphological analyzer client initialized");
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

/// Convert raw rows into tokens, dropping empty rows.
fn rows_to_tokens(rows: Vec<Vec<String>>) -> Vec<Token> {
    rows.into_iter()
        .filter_map(|mut row| {
            if row.is_empty() {
                return None;
            }
            let surface = row.remove(0);
            Some(Token {
                surface,
                features: row,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl MorphAnalyzer for MecabServiceClient {
    async fn analyze(&self, text: &str) -> Result<Vec<Token>> {
        debug!(len = text.len(), "requesting morphological analysis");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "sentence": text }))
            .send()
            .await
            .map_err(|e| EngineError::upstream("mecab", format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::upstream("mecab", format!("returned {status}: {body}")));
        }

        let rows: Vec<Vec<String>> = resp
            .json()
            .await
            .map_err(|e| EngineError::upstream("mecab", format!("bad response: {e}")))?;
        Ok(rows_to_tokens(rows))
    }
}
