//! 动作请求与工具报告
//!
//! ActionRequest 由规划阶段决定（`{"tool": "...", "args": {...}}`）；ToolReport 是执行器对外的唯一输出形态。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 多工具成功时聚合报告使用的工具名
pub const MULTI_TOOL_SUMMARY: &str = "multi_tool_execution_summary";

/// 表示「无需工具」的名称（大小写不敏感）
const NO_TOOL_NAMES: &[&str] = &["", "none", "no_tool", "no_tool_needed", "noop"];

/// 单个动作：工具名 + 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionRequest {
    /// 工具名，必须是「可用工具」中列出的名称
    pub tool: String,
    /// 参数对象，键为参数名
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// 是否为「无需工具」占位
    pub fn is_no_op(&self) -> bool {
        let name = self.tool.trim().to_lowercase();
        NO_TOOL_NAMES.contains(&name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// 失败详情：保留原始错误类型名用于诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub error_type: String,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolReport {
    pub fn success(tool_name: impl Into<String>, output: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Failure,
            output: None,
            error: Some(ToolFailure {
                error_type: error_type.into(),
                error_message: error_message.into(),
            }),
        }
    }

    /// 把多个成功报告包成一个聚合报告
    pub fn summary(reports: Vec<ToolReport>) -> Self {
        let count = reports.len();
        let results: Vec<Value> = reports
            .into_iter()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .collect();
        Self::success(
            MULTI_TOOL_SUMMARY,
            serde_json::json!({
                "tools_executed": count,
                "results": results,
            }),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// 供 prompt 注入的文本形式
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// 多条报告渲染为一段文本
pub fn render_reports(reports: &[ToolReport]) -> String {
    reports
        .iter()
        .map(ToolReport::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_op_names() {
        assert!(ActionRequest::new("None", json!({})).is_no_op());
        assert!(ActionRequest::new(" no_tool ", json!({})).is_no_op());
        assert!(!ActionRequest::new("search", json!({})).is_no_op());
    }

    #[test]
    fn test_action_parses_from_json_without_args() {
        let a: ActionRequest = serde_json::from_str(r#"{"tool": "current_time"}"#).unwrap();
        assert_eq!(a.tool, "current_time");
        assert!(a.args.is_empty());
    }

    #[test]
    fn test_failure_serialization_shape() {
        let r = ToolReport::failure("b", "ValueError", "bad");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "failure");
        assert_eq!(v["error"]["error_type"], "ValueError");
        assert!(v.get("output").is_none());
    }

    #[test]
    fn test_summary_contains_all_outputs() {
        let s = ToolReport::summary(vec![
            ToolReport::success("a", json!("A-out")),
            ToolReport::success("b", json!({"n": 2})),
        ]);
        assert_eq!(s.tool_name, MULTI_TOOL_SUMMARY);
        let out = s.output.unwrap();
        assert_eq!(out["tools_executed"], 2);
        assert_eq!(out["results"][0]["output"], "A-out");
        assert_eq!(out["results"][1]["output"]["n"], 2);
    }
}
