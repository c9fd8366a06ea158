//! Prompt rendering for the parameter at the head of the queue.

use tracing::debug;

use crate::error::Result;
use crate::message::MessageDescriptor;
use crate::skill::Skill;

use super::context::ConversationContext;

/// The prompt that would be shown for the head parameter right now, without
/// consuming any override. `None` when nothing is pending.
pub fn peek_prompt(skill: &Skill, ctx: &ConversationContext) -> Result<Option<MessageDescriptor>> {
    let Some(head) = ctx.head() else {
        return Ok(None);
    };
    let parameter = skill.require_parameter(head)?;
    if let Some(ov) = ctx.prompt_override.as_ref().filter(|ov| ov.parameter == head) {
        return Ok(Some(ov.message.clone()));
    }
    Ok(Some(parameter.prompt.render(ctx)))
}

/// Render the head prompt and consume any pending override. An override
/// aimed at a parameter that is no longer at the head is discarded.
pub fn take_prompt(skill: &Skill, ctx: &mut ConversationContext) -> Result<Option<(String, MessageDescriptor)>> {
    let message = peek_prompt(skill, ctx)?;
    if let Some(ov) = ctx.prompt_override.take() {
        if ctx.head() != Some(ov.parameter.as_str()) {
            debug!(parameter = %ov.parameter, "discarding stale prompt override");
        }
    }
    Ok(match (ctx.head(), message) {
        (Some(head), Some(message)) => Some((head.to_string(), message)),
        _ => None,
    })
}
