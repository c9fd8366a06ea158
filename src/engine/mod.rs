pub mod bot;
pub mod context;
pub mod parser;
pub mod render;
pub mod scheduler;
pub mod store;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::messaging::{DeliveryReceipt, GatewayManager, MessageGateway, PlatformType};
use crate::skill::SkillRegistry;

pub use bot::Bot;
pub use context::{ConversationContext, ScheduleState};
pub use parser::{ParseFailure, ParseOutcome, ParseScope, ParserAdapter};
pub use store::SessionStore;

/// One inbound user event, already normalised by the platform gateway.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub platform: PlatformType,
    /// Where replies go (user id, room id, ...).
    pub channel: String,
    /// Session key; defaults to `platform:channel`.
    pub session: Option<String>,
    /// Skill to start when the session has no live cycle.
    pub skill: Option<String>,
    /// Raw user input: text, or a structured payload (location, postback).
    pub value: Value,
    /// Values recognised alongside the triggering intent.
    pub parameters: Map<String, Value>,
}

impl InboundEvent {
    pub fn new(platform: PlatformType, channel: impl Into<String>, value: Value) -> Self {
        Self {
            platform,
            channel: channel.into(),
            session: None,
            skill: None,
            value,
            parameters: Map::new(),
        }
    }

    pub fn session_key(&self) -> String {
        self.session
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.platform, self.channel))
    }
}

/// Summary of a processed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub session: String,
    pub skill: String,
    pub state: ScheduleState,
    pub prompted: Option<String>,
    pub finished: bool,
    pub receipts: Vec<DeliveryReceipt>,
}

/// Drives skills for every session.
pub struct Engine {
    skills: SkillRegistry,
    gateways: GatewayManager,
    sessions: SessionStore,
    default_skill: String,
}

impl Engine {
    pub fn new(skills: SkillRegistry, gateways: GatewayManager, default_skill: impl Into<String>) -> Self {
        Self {
            skills,
            gateways,
            sessions: SessionStore::new(),
            default_skill: default_skill.into(),
        }
    }

    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one event. The session's stored context is replaced only if
    /// the whole turn, delivery included, succeeds. A session left with no
    /// context, cleared by its finish or never started, is dropped from the
    /// store.
    pub async fn handle(&self, event: &InboundEvent) -> Result<TurnReport> {
        let key = event.session_key();
        let gateway = self.gateways.require(event.platform)?;
        let (slot, mut stored) = self.sessions.lock(&key).await;

        let result = self.turn(&key, event, gateway.as_ref(), &mut stored).await;
        if stored.is_none() && self.sessions.evict(&key, &slot).await {
            debug!(session = %key, "empty session evicted");
        }
        result
    }

    async fn turn(
        &self,
        key: &str,
        event: &InboundEvent,
        gateway: &dyn MessageGateway,
        stored: &mut Option<ConversationContext>,
    ) -> Result<TurnReport> {
        let mut ctx = stored.clone().unwrap_or_default();
        let skill = if ctx.needs_start() {
            let id = event
                .skill
                .as_deref()
                .or(ctx.skill_id.as_deref())
                .unwrap_or(&self.default_skill)
                .to_string();
            let skill = self.skills.get(&id)?;
            scheduler::begin_cycle(&skill, &mut ctx, &event.parameters);
            info!(session = %key, skill = %skill.id, pending = ctx.pending.len(), "collection cycle started");
            skill
        } else {
            let id = ctx.skill_id.clone().unwrap_or_default();
            self.skills.get(&id)?
        };

        let outcome = match scheduler::run_turn(&skill, &mut ctx, event, gateway).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %key, skill = %skill.id, err = %e, "turn aborted");
                return Err(e);
            }
        };

        debug!(session = %key, state = %ctx.state, confirmed = ctx.confirmed.len(), "turn complete");
        let report = TurnReport {
            session: key.to_string(),
            skill: skill.id.clone(),
            state: ctx.state,
            prompted: outcome.prompted,
            finished: outcome.finished,
            receipts: outcome.receipts,
        };
        // A cleared context holds nothing the next cycle needs.
        *stored = if ctx.cleared { None } else { Some(ctx) };
        Ok(report)
    }
}
