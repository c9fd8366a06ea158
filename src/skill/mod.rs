//! Skill schema: what a skill declares, and the compiled form the
//! scheduler runs.
//!
//! A skill lists its required parameters in collection order, optionally a
//! set of optional parameters that stay inert until collected by name, and
//! a finish handler. Hook values are self-contained: they receive
//! everything they need as arguments and capture no receiver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::engine::{Bot, ConversationContext, InboundEvent, ParseOutcome, ParseScope, ParserAdapter};
use crate::error::{EngineError, Result};
use crate::message::MessageDescriptor;
use crate::messaging::DeliveryReceipt;
use crate::nlu::NluRegistry;

// ---------------------------------------------------------------------------
// Hook traits
// ---------------------------------------------------------------------------

/// Skill-supplied parser for bespoke validation.
#[async_trait]
pub trait InlineParser: Send + Sync {
    async fn parse(&self, raw: &Value, scope: &ParseScope<'_>) -> ParseOutcome;
}

/// What the scheduler should do with the head parameter after a reaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionDirective {
    /// Commit on success, keep the parameter pending on failure.
    Proceed,
    /// Commit nothing; the parameter stays pending.
    Hold,
    /// Commit this value regardless of the parse outcome.
    Commit(Value),
}

/// Runs after every parse of a parameter, successful or not.
#[async_trait]
pub trait Reaction: Send + Sync {
    async fn react(&self, outcome: &ParseOutcome, raw: &Value, bot: &mut Bot<'_>) -> Result<ReactionDirective>;
}

/// Terminal step of a skill.
#[async_trait]
pub trait FinishHandler: Send + Sync {
    async fn finish(&self, bot: &mut Bot<'_>, event: &InboundEvent) -> Result<DeliveryReceipt>;
}

struct FnParser<F>(F);

#[async_trait]
impl<F> InlineParser for FnParser<F>
where
    F: Fn(&Value, &ParseScope<'_>) -> ParseOutcome + Send + Sync,
{
    async fn parse(&self, raw: &Value, scope: &ParseScope<'_>) -> ParseOutcome {
        (self.0)(raw, scope)
    }
}

/// Wrap a synchronous function as an inline parser.
pub fn parser_fn<F>(f: F) -> Arc<dyn InlineParser>
where
    F: Fn(&Value, &ParseScope<'_>) -> ParseOutcome + Send + Sync + 'static,
{
    Arc::new(FnParser(f))
}

struct FnReaction<F>(F);

#[async_trait]
impl<F> Reaction for FnReaction<F>
where
    F: Fn(&ParseOutcome, &Value, &mut Bot<'_>) -> Result<ReactionDirective> + Send + Sync,
{
    async fn react(&self, outcome: &ParseOutcome, raw: &Value, bot: &mut Bot<'_>) -> Result<ReactionDirective> {
        (self.0)(outcome, raw, bot)
    }
}

/// Wrap a synchronous function as a reaction.
pub fn reaction_fn<F>(f: F) -> Arc<dyn Reaction>
where
    F: Fn(&ParseOutcome, &Value, &mut Bot<'_>) -> Result<ReactionDirective> + Send + Sync + 'static,
{
    Arc::new(FnReaction(f))
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Where a parameter's prompt comes from.
#[derive(Clone)]
pub enum PromptSource {
    Static(MessageDescriptor),
    /// Built from the current context; must not have side effects.
    Dynamic(Arc<dyn Fn(&ConversationContext) -> MessageDescriptor + Send + Sync>),
}

impl PromptSource {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ConversationContext) -> MessageDescriptor + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn render(&self, ctx: &ConversationContext) -> MessageDescriptor {
        match self {
            Self::Static(message) => message.clone(),
            Self::Dynamic(f) => f(ctx),
        }
    }
}

impl From<MessageDescriptor> for PromptSource {
    fn from(message: MessageDescriptor) -> Self {
        Self::Static(message)
    }
}

/// Declared parser shape.
#[derive(Clone)]
pub enum ParserSpec {
    /// No parser: the raw value is accepted as-is.
    Passthrough,
    /// A registered NLU service; the slot named after the parameter is used.
    Service(String),
    /// A registered NLU service and an explicit slot.
    SubParameter { service: String, parameter: String },
    Inline(Arc<dyn InlineParser>),
}

#[derive(Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub prompt: PromptSource,
    pub parser: ParserSpec,
    pub reaction: Option<Arc<dyn Reaction>>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, prompt: impl Into<PromptSource>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            parser: ParserSpec::Passthrough,
            reaction: None,
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.parser = ParserSpec::Service(service.into());
        self
    }

    pub fn sub_parameter(mut self, service: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.parser = ParserSpec::SubParameter {
            service: service.into(),
            parameter: parameter.into(),
        };
        self
    }

    pub fn inline(mut self, parser: Arc<dyn InlineParser>) -> Self {
        self.parser = ParserSpec::Inline(parser);
        self
    }

    pub fn reaction(mut self, reaction: Arc<dyn Reaction>) -> Self {
        self.reaction = Some(reaction);
        self
    }
}

/// Everything a skill declares.
pub struct SkillDefinition {
    pub id: String,
    pub required: Vec<ParameterDefinition>,
    pub optional: Vec<ParameterDefinition>,
    pub clear_context_on_finish: bool,
    pub finish: Arc<dyn FinishHandler>,
}

impl SkillDefinition {
    pub fn new(id: impl Into<String>, finish: Arc<dyn FinishHandler>) -> Self {
        Self {
            id: id.into(),
            required: Vec::new(),
            optional: Vec::new(),
            clear_context_on_finish: false,
            finish,
        }
    }

    pub fn required(mut self, parameter: ParameterDefinition) -> Self {
        self.required.push(parameter);
        self
    }

    pub fn optional(mut self, parameter: ParameterDefinition) -> Self {
        self.optional.push(parameter);
        self
    }

    pub fn clear_context_on_finish(mut self, clear: bool) -> Self {
        self.clear_context_on_finish = clear;
        self
    }
}

// ---------------------------------------------------------------------------
// Compiled skill
// ---------------------------------------------------------------------------

/// A parameter with its parser resolved.
pub struct Parameter {
    pub name: String,
    pub required: bool,
    pub prompt: PromptSource,
    pub adapter: ParserAdapter,
    pub reaction: Option<Arc<dyn Reaction>>,
}

pub struct Skill {
    pub id: String,
    parameters: Vec<Parameter>,
    pub clear_context_on_finish: bool,
    pub finish: Arc<dyn FinishHandler>,
}

impl Skill {
    /// Validate a definition and resolve every parser against `nlu`.
    pub fn compile(def: SkillDefinition, nlu: &NluRegistry) -> Result<Self> {
        if def.id.trim().is_empty() {
            return Err(EngineError::Schema("skill id must not be empty".into()));
        }

        let mut parameters: Vec<Parameter> = Vec::with_capacity(def.required.len() + def.optional.len());
        let groups = [(true, def.required), (false, def.optional)];
        for (required, group) in groups {
            for p in group {
                if p.name.is_empty() {
                    return Err(EngineError::Schema(format!("skill {} has an unnamed parameter", def.id)));
                }
                if parameters.iter().any(|existing| existing.name == p.name) {
                    return Err(EngineError::Schema(format!(
                        "skill {} declares parameter {} twice",
                        def.id, p.name
                    )));
                }
                let adapter = ParserAdapter::resolve(&p.parser, &p.name, nlu)?;
                parameters.push(Parameter {
                    name: p.name,
                    required,
                    prompt: p.prompt,
                    adapter,
                    reaction: p.reaction,
                });
            }
        }

        Ok(Self {
            id: def.id,
            parameters,
            clear_context_on_finish: def.clear_context_on_finish,
            finish: def.finish,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Like `parameter`, but an undeclared name is a schema error.
    pub fn require_parameter(&self, name: &str) -> Result<&Parameter> {
        self.parameter(name)
            .ok_or_else(|| EngineError::Schema(format!("skill {} has no parameter {name}", self.id)))
    }

    /// Required parameter names in declaration order.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter(|p| p.required).map(|p| p.name.as_str())
    }

    pub fn optional_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter(|p| !p.required).map(|p| p.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Compiled skills by id.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            skills: HashMap::new(),
        }
    }

    /// Compile and register a skill. Duplicate ids are a schema error.
    pub fn register(&mut self, def: SkillDefinition, nlu: &NluRegistry) -> Result<()> {
        if self.skills.contains_key(&def.id) {
            return Err(EngineError::Schema(format!("duplicate skill id: {}", def.id)));
        }
        let skill = Skill::compile(def, nlu)?;
        info!(
            skill = %skill.id,
            required = skill.required_names().count(),
            optional = skill.optional_names().count(),
            "skill registered"
        );
        self.skills.insert(skill.id.clone(), Arc::new(skill));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Skill>> {
        self.skills
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SkillNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.skills.keys().map(|s| s.as_str()).collect();
        ids.sort();
        ids
    }
}
