//! Error taxonomy for the plugin runtime.
//!
//! Bundle-local and call-local failures (`MalformedManifest`,
//! `ToolModuleLoadFailure`, `UnknownTool`, `ToolExecutionFailure`) are
//! reported and isolated. Only `ToolLoopExceeded`, `ModelUnavailable` and
//! `Cancelled` end a turn early.

/// Errors raised by the skill runtime.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SkillError {
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("tool module of bundle '{bundle}' failed to load: {reason}")]
    ToolModuleLoadFailure { bundle: String, reason: String },

    #[error("unknown skill requested: {0}")]
    UnknownSkillRequested(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{tool}' failed: {reason}")]
    ToolExecutionFailure { tool: String, reason: String },

    #[error("tool loop exceeded {max_rounds} rounds")]
    ToolLoopExceeded { max_rounds: u32 },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("turn cancelled")]
    Cancelled,
}

impl SkillError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        SkillError::MalformedManifest(reason.into())
    }

    pub(crate) fn load_failure(bundle: &str, reason: impl Into<String>) -> Self {
        SkillError::ToolModuleLoadFailure {
            bundle: bundle.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn execution(tool: &str, reason: impl Into<String>) -> Self {
        SkillError::ToolExecutionFailure {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<skillbot_providers::ProviderError> for SkillError {
    fn from(err: skillbot_providers::ProviderError) -> Self {
        SkillError::ModelUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SkillError>;
