use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A skill asked for something its schema does not declare, or the
    /// scheduler was driven into an impossible transition.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("upstream service {service} failed: {message}")]
    Upstream { service: String, message: String },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),
}

impl EngineError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
