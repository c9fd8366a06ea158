//! Parser adapter: one asynchronous parse contract over every parser shape
//! a skill can declare.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::messaging::PlatformType;
use crate::nlu::{NluRegistry, NluService};
use crate::skill::{InlineParser, ParserSpec};

use super::context::ConversationContext;

/// Why a raw value could not be turned into a parameter value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseFailure {
    #[error("unrecognized input: {0}")]
    Unrecognized(String),

    #[error("upstream {service} failed: {detail}")]
    Upstream { service: String, detail: String },
}

impl ParseFailure {
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        Self::Unrecognized(reason.into())
    }

    /// Reduce an upstream error to a failure outcome. Non-upstream errors
    /// are attributed to `service`.
    pub fn from_upstream(err: EngineError, service: &str) -> Self {
        match err {
            EngineError::Upstream { service, message } => Self::Upstream {
                service,
                detail: message,
            },
            other => Self::Upstream {
                service: service.to_string(),
                detail: other.to_string(),
            },
        }
    }
}

/// What a parser resolves to.
pub type ParseOutcome = std::result::Result<Value, ParseFailure>;

/// Read-only view handed to parsers.
pub struct ParseScope<'a> {
    pub parameter: &'a str,
    pub platform: PlatformType,
    pub context: &'a ConversationContext,
}

/// A parser declaration resolved against the service registry.
#[derive(Clone)]
pub enum ParserAdapter {
    /// Raw value accepted as-is.
    Passthrough,
    /// Delegates to an NLU service and selects `slot` from its answer.
    Service {
        service: Arc<dyn NluService>,
        slot: String,
    },
    Inline(Arc<dyn InlineParser>),
}

impl std::fmt::Debug for ParserAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passthrough => f.write_str("Passthrough"),
            Self::Service { service, slot } => f
                .debug_struct("Service")
                .field("service", &service.name())
                .field("slot", slot)
                .finish(),
            Self::Inline(_) => f.write_str("Inline"),
        }
    }
}

impl ParserAdapter {
    /// Resolve a declared parser shape. A named-service parser selects the
    /// slot named after the parameter itself; a sub-parameter parser names
    /// the slot explicitly. Unknown services are a schema error.
    pub fn resolve(spec: &ParserSpec, parameter: &str, nlu: &NluRegistry) -> Result<Self> {
        let lookup = |name: &str| {
            nlu.get(name).ok_or_else(|| {
                EngineError::Schema(format!(
                    "parameter {parameter} references unknown parser service {name}"
                ))
            })
        };
        Ok(match spec {
            ParserSpec::Passthrough => Self::Passthrough,
            ParserSpec::Service(name) => Self::Service {
                service: lookup(name)?,
                slot: parameter.to_string(),
            },
            ParserSpec::SubParameter { service, parameter: slot } => Self::Service {
                service: lookup(service)?,
                slot: slot.clone(),
            },
            ParserSpec::Inline(parser) => Self::Inline(parser.clone()),
        })
    }

    /// Parse one raw value. Never errors: every problem becomes a failure
    /// outcome for the reaction to handle.
    pub async fn parse(&self, raw: &Value, scope: &ParseScope<'_>) -> ParseOutcome {
        match self {
            Self::Passthrough => {
                if raw.is_null() {
                    Err(ParseFailure::unrecognized("empty input"))
                } else {
                    Ok(raw.clone())
                }
            }
            Self::Service { service, slot } => {
                let Some(text) = raw.as_str() else {
                    return Err(ParseFailure::unrecognized(format!(
                        "{} expects text input",
                        service.name()
                    )));
                };
                let classification = service
                    .classify(text)
                    .await
                    .map_err(|e| ParseFailure::from_upstream(e, service.name()))?;
                debug!(
                    parameter = scope.parameter,
                    turn = scope.context.turns,
                    service = service.name(),
                    intent = %classification.intent,
                    "NLU classification"
                );
                classification
                    .slot(slot)
                    .cloned()
                    .ok_or_else(|| ParseFailure::unrecognized(format!("no {slot} in response")))
            }
            Self::Inline(parser) => parser.parse(raw, scope).await,
        }
    }
}
