//! 请求状态机
//!
//! Start → ContextBuilt → AnalysisRunning → AnalysisDone → ResponseRunning → Streaming → Completed，
//! 任意非终止状态都可进入 Failed；回复阶段重试时 Streaming 回到 ResponseRunning。

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    ContextBuilt,
    AnalysisRunning,
    AnalysisDone,
    ResponseRunning,
    Streaming,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Start, ContextBuilt)
            | (ContextBuilt, AnalysisRunning)
            | (AnalysisRunning, AnalysisDone)
            | (AnalysisDone, ResponseRunning)
            | (ResponseRunning, Streaming)
            | (Streaming, ResponseRunning)
            | (Streaming, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid pipeline transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// 单个请求的轨迹：当前状态、迁移历史、尝试次数、选中的模型
#[derive(Debug, Clone, Serialize)]
pub struct RequestTrace {
    pub request_id: String,
    pub state: PipelineState,
    pub transitions: Vec<(PipelineState, DateTime<Utc>)>,
    /// 回复阶段已发起的尝试次数
    pub attempts: u32,
    pub analysis_model: Option<String>,
    pub response_model: Option<String>,
}

impl RequestTrace {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            state: PipelineState::Start,
            transitions: vec![(PipelineState::Start, Utc::now())],
            attempts: 0,
            analysis_model: None,
            response_model: None,
        }
    }

    /// 迁移到 next，返回迁移前的状态
    pub fn advance(&mut self, next: PipelineState) -> Result<PipelineState, InvalidTransition> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        self.state = next;
        self.transitions.push((next, Utc::now()));
        Ok(from)
    }

    /// 迁移历史中的状态序列
    pub fn path(&self) -> Vec<PipelineState> {
        self.transitions.iter().map(|(s, _)| *s).collect()
    }
}
