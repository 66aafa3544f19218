//! 核心编排层：请求状态机、错误分类、两阶段编排器

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::{BuildError, OrchestratorError};
pub use orchestrator::{selector_from_env, Orchestrator, OrchestratorBuilder, PipelineSettings, RequestOutcome};
pub use state::{InvalidTransition, PipelineState, RequestTrace};
