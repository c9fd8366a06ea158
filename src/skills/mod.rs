//! Skills shipped with the binary.

pub mod datetimepicker;
pub mod pizza_order;

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::morph::MorphAnalyzer;
use crate::nlu::NluRegistry;
use crate::skill::SkillRegistry;

/// Register every built-in skill whose services are available.
/// `pizza-order` needs both an NLU service and a morphological analyzer.
pub fn register_builtin(
    skills: &mut SkillRegistry,
    nlu: &NluRegistry,
    nlu_service: Option<&str>,
    analyzer: Option<Arc<dyn MorphAnalyzer>>,
) -> Result<()> {
    skills.register(datetimepicker::definition(), nlu)?;

    match (nlu_service, analyzer) {
        (Some(service), Some(analyzer)) => skills.register(pizza_order::definition(service, analyzer), nlu)?,
        _ => warn!(skill = pizza_order::SKILL_ID, "skipped: requires NLU and morphological analysis"),
    }
    Ok(())
}
