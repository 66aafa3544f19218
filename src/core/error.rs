//! 编排错误
//!
//! 模型调用错误只用于驱动冷却与重试，不直接展示给用户；用户只会看到配置中的简短失败提示。

use thiserror::Error;

use super::state::InvalidTransition;
use crate::config::ConfigError;
use crate::llm::{LlmError, SelectionError};
use crate::platform::SinkError;
use crate::tools::CatalogError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 角色的模型全部在冷却或本次全部失败
    #[error("no model available for role '{role}' ({failed} failed, {cooling} cooling down)")]
    NoModelAvailable {
        role: String,
        failed: usize,
        cooling: usize,
    },

    #[error("model call failed ({model}): {source}")]
    ModelCall {
        model: String,
        #[source]
        source: LlmError,
    },

    /// 回复阶段重试耗尽
    #[error("response generation failed after {attempts} attempts: {last}")]
    StreamGeneration { attempts: u32, last: String },

    #[error("message sink error: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl OrchestratorError {
    /// 该错误是否值得再试一次（配置与状态机错误不重试）
    ///
    /// 全部模型都在冷却且本次没有发生任何调用时也不重试：冷却不会在重试间隔内结束。
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::Config(_)
                | OrchestratorError::Transition(_)
                | OrchestratorError::NoModelAvailable { failed: 0, .. }
        )
    }
}

impl From<SelectionError> for OrchestratorError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::Config(c) => OrchestratorError::Config(c),
            SelectionError::Exhausted {
                role,
                failures,
                skipped,
            } => OrchestratorError::NoModelAvailable {
                role,
                failed: failures.len(),
                cooling: skipped,
            },
        }
    }
}

/// 构建 Orchestrator 时的错误
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("missing component: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ErrorCategory, ModelFailure};

    #[test]
    fn test_exhausted_selection_message_not_repeated() {
        let err: OrchestratorError = SelectionError::Exhausted {
            role: "response".to_string(),
            failures: vec![ModelFailure {
                model: "mock:r".to_string(),
                category: ErrorCategory::Transient,
                message: "reset".to_string(),
            }],
            skipped: 2,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "no model available for role 'response' (1 failed, 2 cooling down)"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_all_cooling_is_not_retried() {
        let err = OrchestratorError::NoModelAvailable {
            role: "response".to_string(),
            failed: 0,
            cooling: 3,
        };
        assert!(!err.is_retryable());
    }
}
