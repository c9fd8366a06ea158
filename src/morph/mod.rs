mod mecab;

use serde::Deserialize;

use crate::error::Result;

pub use mecab::MecabServiceClient;

/// One morpheme: its surface form plus the analyzer's feature columns
/// (part of speech first, then successively finer sub-classifications).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Token {
    pub surface: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Token {
    #[cfg(test)]
    pub fn new(surface: impl Into<String>, features: &[&str]) -> Self {
        Self {
            surface: surface.into(),
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Feature column `index`, if present.
    pub fn feature(&self, index: usize) -> Option<&str> {
        self.features.get(index).map(|s| s.as_str())
    }

    /// True when the leading feature columns equal `prefix`, column by column.
    pub fn is(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.features.len()
            && prefix.iter().zip(&self.features).all(|(want, have)| *want == have)
    }
}

/// Splits text into tagged tokens.
#[async_trait::async_trait]
pub trait MorphAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Vec<Token>>;
}
