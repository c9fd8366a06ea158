pub mod bridge;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::message::MessageDescriptor;

// ---------------------------------------------------------------------------
// Platform discriminator
// ---------------------------------------------------------------------------

/// Which chat platform delivered an event. Parsers and reactions branch on
/// this when the raw payload shape differs per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    Line,
    Facebook,
    Generic,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Facebook => "facebook",
            Self::Generic => "generic",
        }
    }

    /// Unknown platform names fall back to `Generic`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "line" => Self::Line,
            "facebook" | "messenger" => Self::Facebook,
            _ => Self::Generic,
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Outbound side of a chat platform. The engine hands it fully rendered
/// descriptors; how they become platform API calls is the gateway's job.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    fn platform(&self) -> PlatformType;

    /// How many messages one platform send may carry (0 = unlimited).
    fn max_messages_per_reply(&self) -> usize;

    /// Send one batch to the given channel.
    async fn send(&self, channel: &str, messages: &[MessageDescriptor]) -> Result<()>;
}

/// Proof that a batch reached the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub id: String,
    pub platform: PlatformType,
    pub channel: String,
    pub message_count: usize,
    pub delivered_at: DateTime<Utc>,
}

/// Send `messages` through `gateway`, splitting into as many platform sends
/// as the per-reply limit requires.
pub async fn deliver(
    gateway: &dyn MessageGateway,
    channel: &str,
    messages: &[MessageDescriptor],
) -> Result<DeliveryReceipt> {
    for chunk in split_batch(messages, gateway.max_messages_per_reply()) {
        gateway.send(channel, chunk).await?;
    }
    debug!(
        platform = %gateway.platform(),
        channel,
        count = messages.len(),
        "batch delivered"
    );
    Ok(DeliveryReceipt {
        id: Uuid::new_v4().to_string(),
        platform: gateway.platform(),
        channel: channel.to_string(),
        message_count: messages.len(),
        delivered_at: Utc::now(),
    })
}

// ---------------------------------------------------------------------------
// Gateway manager
// ---------------------------------------------------------------------------

/// Holds one gateway per platform.
pub struct GatewayManager {
    gateways: HashMap<PlatformType, Arc<dyn MessageGateway>>,
}

impl GatewayManager {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    /// Register a gateway. A later registration for the same platform
    /// replaces the earlier one.
    pub fn register(&mut self, gateway: Arc<dyn MessageGateway>) {
        info!(platform = %gateway.platform(), "registered message gateway");
        self.gateways.insert(gateway.platform(), gateway);
    }

    pub fn get(&self, platform: PlatformType) -> Option<Arc<dyn MessageGateway>> {
        self.gateways.get(&platform).cloned()
    }

    /// Like `get`, but a missing gateway is a delivery failure.
    pub fn require(&self, platform: PlatformType) -> Result<Arc<dyn MessageGateway>> {
        self.get(platform)
            .ok_or_else(|| EngineError::Delivery(format!("no gateway registered for {platform}")))
    }

    pub fn platforms(&self) -> Vec<PlatformType> {
        let mut out: Vec<_> = self.gateways.keys().copied().collect();
        out.sort_by_key(|p| p.as_str());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Batch splitting
// ---------------------------------------------------------------------------

/// Split a batch into chunks of at most `max` messages. An empty batch
/// yields no chunks; `max == 0` means no limit.
pub fn split_batch(messages: &[MessageDescriptor], max: usize) -> Vec<&[MessageDescriptor]> {
    if messages.is_empty() {
        return Vec::new();
    }
    if max == 0 {
        return vec![messages];
    }
    messages.chunks(max).collect()
}
