mod dialogflow;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;

pub use dialogflow::DialogflowClient;

/// Result of an intent/slot extraction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Classification {
    /// A slot value, if present and not blank.
    pub fn slot(&self, name: &str) -> Option<&Value> {
        match self.parameters.get(name)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            v => Some(v),
        }
    }
}

/// An external intent/slot classifier. Implementations are registered
/// under a name that skills reference from their parser declarations.
#[async_trait::async_trait]
pub trait NluService: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<Classification>;
}

/// Registry of NLU services by name.
pub struct NluRegistry {
    services: HashMap<String, Arc<dyn NluService>>,
}

impl NluRegistry {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    pub fn register(&mut self, service: Arc<dyn NluService>) {
        info!(service = service.name(), "NLU service registered");
        self.services.insert(service.name().to_string(), service);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NluService>> {
        self.services.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}
