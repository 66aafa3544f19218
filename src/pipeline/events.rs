//! 流水线过程事件：供状态面板 / 日志订阅者观察每个请求的进展

use serde::Serialize;

use crate::core::PipelineState;
use crate::llm::ErrorCategory;
use crate::tools::ToolReport;

/// 单个请求的过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 状态机迁移
    StateChanged {
        request_id: String,
        from: PipelineState,
        to: PipelineState,
    },
    /// 某阶段选定模型
    ModelSelected {
        request_id: String,
        stage: String,
        model: String,
    },
    /// 模型调用失败（已记入熔断器）
    ModelFailed {
        request_id: String,
        model: String,
        category: ErrorCategory,
        message: String,
    },
    /// 工具批次执行结果
    ToolReports {
        request_id: String,
        stage: String,
        reports: Vec<ToolReport>,
    },
    /// 回复阶段重试
    Retrying {
        request_id: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    Completed {
        request_id: String,
        model: String,
        chars: usize,
    },
    Failed {
        request_id: String,
        reason: String,
    },
}
