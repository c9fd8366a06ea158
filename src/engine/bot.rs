//! The restricted handle hooks use to affect scheduling and messaging.

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::message::MessageDescriptor;
use crate::messaging::{self, DeliveryReceipt, MessageGateway, PlatformType};
use crate::skill::Skill;

use super::context::{ConversationContext, PromptOverride};

/// Messages and bookkeeping accumulated during one turn.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    pub outbox: Vec<MessageDescriptor>,
    pub receipts: Vec<DeliveryReceipt>,
    /// Names passed to `collect` during the current reaction.
    pub collected: Vec<String>,
}

pub struct Bot<'a> {
    context: &'a mut ConversationContext,
    skill: &'a Skill,
    platform: PlatformType,
    channel: &'a str,
    gateway: &'a dyn MessageGateway,
    buffer: &'a mut TurnBuffer,
}

impl<'a> Bot<'a> {
    pub(crate) fn new(
        context: &'a mut ConversationContext,
        skill: &'a Skill,
        platform: PlatformType,
        channel: &'a str,
        gateway: &'a dyn MessageGateway,
        buffer: &'a mut TurnBuffer,
    ) -> Self {
        Self {
            context,
            skill,
            platform,
            channel,
            gateway,
            buffer,
        }
    }

    /// The platform that delivered the current event.
    pub fn platform_type(&self) -> PlatformType {
        self.platform
    }

    pub fn context(&self) -> &ConversationContext {
        self.context
    }

    pub fn confirmed(&self, name: &str) -> Option<&Value> {
        self.context.confirmed.get(name)
    }

    /// Put `name` at the front of the remaining work. Works for confirmed
    /// parameters too, forcing them to be asked again.
    pub fn collect(&mut self, name: &str) -> Result<()> {
        self.skill.require_parameter(name)?;
        debug!(skill = %self.skill.id, parameter = name, "collect");
        self.context.enqueue_front(name);
        self.buffer.collected.retain(|n| n != name);
        self.buffer.collected.push(name.to_string());
        Ok(())
    }

    /// Replace the next prompt for `name`, once.
    pub fn change_message_to_confirm(&mut self, name: &str, message: MessageDescriptor) -> Result<()> {
        self.skill.require_parameter(name)?;
        self.context.prompt_override = Some(PromptOverride {
            parameter: name.to_string(),
            message,
        });
        Ok(())
    }

    /// Add a message to this turn's outgoing batch.
    pub fn queue(&mut self, message: MessageDescriptor) {
        self.buffer.outbox.push(message);
    }

    /// Send everything queued so far followed by `messages`.
    pub async fn reply(&mut self, messages: Vec<MessageDescriptor>) -> Result<DeliveryReceipt> {
        let mut batch = std::mem::take(&mut self.buffer.outbox);
        batch.extend(messages);
        let receipt = messaging::deliver(self.gateway, self.channel, &batch).await?;
        self.buffer.receipts.push(receipt.clone());
        Ok(receipt)
    }
}
