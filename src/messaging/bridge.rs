use async_trait::async_trait;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::message::MessageDescriptor;

use super::{MessageGateway, PlatformType};

/// HTTP bridge gateway for platforms whose API calls are made by an external
/// relay process (LINE, Messenger, or a generic webchat).
///
/// The bridge must implement `POST /send` with JSON
/// `{"to": "...", "messages": [...]}` and answer 2xx on success.
pub struct BridgeGateway {
    platform: PlatformType,
    bridge_url: String,
    max_messages: usize,
    http: reqwest::Client,
}

impl BridgeGateway {
    pub fn new(platform: PlatformType, bridge_url: String, max_messages: usize) -> Self {
        Self {
            platform,
            bridge_url: bridge_url.trim_end_matches('/').to_string(),
            max_messages,
            http: reqwest::Client::new(),
        }
    }

    fn send_url(&self) -> String {
        format!("{}/send", self.bridge_url)
    }
}

#[async_trait]
impl MessageGateway for BridgeGateway {
    fn platform(&self) -> PlatformType {
        self.platform
    }

    fn max_messages_per_reply(&self) -> usize {
        self.max_messages
    }

    async fn send(&self, channel: &str, messages: &[MessageDescriptor]) -> Result<()> {
        debug!(platform = %self.platform, channel, count = messages.len(), "sending batch via bridge");

        let resp = self
            .http
            .post(self.send_url())
            .json(&serde_json::json!({
                "to": channel,
                "messages": messages,
            }))
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| EngineError::Delivery(format!("{} bridge send failed: {e}", self.platform)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Delivery(format!(
                "{} bridge returned {status}: {body}",
                self.platform
            )));
        }

        Ok(())
    }
}
