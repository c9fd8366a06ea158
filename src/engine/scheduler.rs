//! The collection state machine.
//!
//! One call to [`run_turn`] handles one inbound event: it parses the event
//! against the head parameter (if a prompt is outstanding), runs the
//! reaction, then either renders the next prompt or runs finish. Exactly
//! one prompt goes out per turn.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::messaging::{self, DeliveryReceipt, MessageGateway};
use crate::skill::{ReactionDirective, Skill};

use super::bot::{Bot, TurnBuffer};
use super::context::{ConversationContext, ScheduleState};
use super::parser::{ParseOutcome, ParseScope};
use super::render;
use super::InboundEvent;

/// What happened during one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Parameter whose prompt went out, if any.
    pub prompted: Option<String>,
    pub finished: bool,
    pub receipts: Vec<DeliveryReceipt>,
}

/// Seed a fresh cycle: record the skill, commit declared pre-filled values
/// and queue every required parameter not pre-filled by this event, in
/// declaration order.
///
/// A session left `Idle` by a skill that keeps its context still holds the
/// previous cycle's values. They stay readable, but each required parameter
/// is asked again so finish only runs on fresh input.
pub fn begin_cycle(skill: &Skill, ctx: &mut ConversationContext, prefill: &serde_json::Map<String, Value>) {
    if ctx.skill_id.as_deref() != Some(skill.id.as_str()) {
        ctx.clear();
    }
    if !ctx.confirmed.is_empty() {
        debug!(skill = %skill.id, kept = ?ctx.confirmed.names(), "reopening finished cycle");
    }
    ctx.skill_id = Some(skill.id.clone());
    ctx.cleared = false;
    ctx.prompt_override = None;
    ctx.pending.clear();

    let mut prefilled = Vec::new();
    for (name, value) in prefill {
        if skill.parameter(name).is_some() && !value.is_null() {
            ctx.confirmed.insert(name, value.clone());
            prefilled.push(name.as_str());
        } else {
            debug!(skill = %skill.id, parameter = %name, "ignoring undeclared pre-filled value");
        }
    }
    for name in skill.required_names() {
        if !prefilled.contains(&name) {
            ctx.enqueue_back(name);
        }
    }
    ctx.state = ScheduleState::AwaitingPrompt;
}

/// Guard entry into `Finishing`: finish may only run from a live cycle.
pub fn enter_finishing(ctx: &mut ConversationContext) -> Result<()> {
    match ctx.state {
        ScheduleState::Idle | ScheduleState::Finishing => Err(EngineError::Schema(format!(
            "finish requested while {}",
            ctx.state
        ))),
        _ if !ctx.pending.is_empty() => Err(EngineError::Schema(format!(
            "finish requested with {} parameter(s) pending",
            ctx.pending.len()
        ))),
        _ => {
            ctx.state = ScheduleState::Finishing;
            Ok(())
        }
    }
}

/// Apply a reaction directive for `name`.
fn apply_directive(
    ctx: &mut ConversationContext,
    name: &str,
    outcome: ParseOutcome,
    directive: ReactionDirective,
    recollected: bool,
) {
    let committed = match directive {
        ReactionDirective::Hold => None,
        ReactionDirective::Proceed => outcome.ok(),
        ReactionDirective::Commit(value) => Some(value),
    };
    if let Some(value) = committed {
        ctx.confirmed.insert(name, value);
        if !recollected {
            ctx.dequeue(name);
        }
    }
}

/// Process one event for a session whose context is `ctx`.
///
/// `ctx` is mutated in place; callers that need all-or-nothing semantics
/// run this on a copy and keep it only on success.
pub async fn run_turn(
    skill: &Skill,
    ctx: &mut ConversationContext,
    event: &InboundEvent,
    gateway: &dyn MessageGateway,
) -> Result<TurnOutcome> {
    let mut buffer = TurnBuffer::default();
    let mut outcome = TurnOutcome::default();
    ctx.touch();

    if ctx.state == ScheduleState::AwaitingInput {
        if let Some(head) = ctx.head().map(str::to_string) {
            let parameter = skill.require_parameter(&head)?;
            let parsed = {
                let scope = ParseScope {
                    parameter: &head,
                    platform: event.platform,
                    context: ctx,
                };
                parameter.adapter.parse(&event.value, &scope).await
            };
            debug!(
                skill = %skill.id,
                parameter = %head,
                ok = parsed.is_ok(),
                "input parsed"
            );

            ctx.state = ScheduleState::Reacting;
            let directive = match &parameter.reaction {
                Some(reaction) => {
                    let mut bot = Bot::new(ctx, skill, event.platform, &event.channel, gateway, &mut buffer);
                    reaction.react(&parsed, &event.value, &mut bot).await?
                }
                None => ReactionDirective::Proceed,
            };
            let recollected = buffer.collected.iter().any(|n| *n == head);
            apply_directive(ctx, &head, parsed, directive, recollected);
            buffer.collected.clear();
        }
        ctx.state = ScheduleState::AwaitingPrompt;
    }

    match render::take_prompt(skill, ctx)? {
        Some((name, prompt)) => {
            debug!(skill = %skill.id, parameter = %name, kind = prompt.kind(), "prompting");
            buffer.outbox.push(prompt);
            ctx.state = ScheduleState::AwaitingInput;
            outcome.prompted = Some(name);
        }
        None => {
            enter_finishing(ctx)?;
            {
                let mut bot = Bot::new(ctx, skill, event.platform, &event.channel, gateway, &mut buffer);
                skill.finish.finish(&mut bot, event).await?;
            }
            info!(skill = %skill.id, confirmed = ?ctx.confirmed.names(), "skill finished");
            if skill.clear_context_on_finish {
                ctx.clear();
            } else {
                ctx.state = ScheduleState::Idle;
            }
            outcome.finished = true;
        }
    }

    if !buffer.outbox.is_empty() {
        let batch = std::mem::take(&mut buffer.outbox);
        let receipt = messaging::deliver(gateway, &event.channel, &batch).await?;
        buffer.receipts.push(receipt);
    }
    outcome.receipts = buffer.receipts;
    Ok(outcome)
}
