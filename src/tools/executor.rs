//! 工具执行器
//!
//! 按顺序执行动作列表：跳过「无需工具」项，逐个在超时内调用目录中的工具。
//! 首个失败立即终止批次，只返回该失败报告（此前成功工具的副作用不回滚）；
//! 全部成功时，单个报告原样返回，多个报告聚合为一条汇总报告。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use super::registry::{ToolCatalog, ToolError};
use super::{ActionRequest, ToolExecutionContext, ToolReport};

pub struct ToolExecutor {
    catalog: Arc<ToolCatalog>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(catalog: Arc<ToolCatalog>, timeout_secs: u64) -> Self {
        Self {
            catalog,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// 执行动作列表；全部为「无需工具」时返回空列表
    pub async fn execute(
        &self,
        actions: &[ActionRequest],
        ctx: &ToolExecutionContext,
    ) -> Vec<ToolReport> {
        let mut reports = Vec::new();
        for action in actions.iter().filter(|a| !a.is_no_op()) {
            let report = self.execute_one(action, ctx).await;
            if !report.is_success() {
                tracing::warn!(
                    parent: &ctx.span,
                    tool = %action.tool,
                    skipped = reports.len(),
                    "Tool batch aborted on first failure"
                );
                return vec![report];
            }
            reports.push(report);
        }
        match reports.len() {
            0 | 1 => reports,
            _ => vec![ToolReport::summary(reports)],
        }
    }

    async fn execute_one(&self, action: &ActionRequest, ctx: &ToolExecutionContext) -> ToolReport {
        let tool = match self.catalog.get(&action.tool) {
            Ok(tool) => tool,
            Err(e) => {
                audit(&action.tool, &action.args, false, "not_found", Duration::ZERO);
                return ToolReport::failure(&action.tool, e.error_type(), e.to_string());
            }
        };

        if let Some(missing) = tool
            .parameters()
            .iter()
            .find(|p| p.required && action.args.get(&p.name).map_or(true, Value::is_null))
        {
            let e = ToolError::MissingArgument(missing.name.clone());
            audit(&action.tool, &action.args, false, "invalid_args", Duration::ZERO);
            return ToolReport::failure(&action.tool, e.error_type(), e.to_string());
        }

        // 类型不符同样不调用处理函数；显式 null 视为未提供
        if let Some((param, value)) = tool.parameters().iter().find_map(|p| {
            action
                .args
                .get(&p.name)
                .filter(|v| !v.is_null() && !p.param_type.accepts(v))
                .map(|v| (p, v))
        }) {
            let e = ToolError::InvalidArgument {
                name: param.name.clone(),
                reason: format!("expected {}, got {}", param.param_type, json_kind(value)),
            };
            audit(&action.tool, &action.args, false, "invalid_args", Duration::ZERO);
            return ToolReport::failure(&action.tool, e.error_type(), e.to_string());
        }

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(ctx, &action.args)).await;
        let elapsed = start.elapsed();

        let result = match result {
            Ok(inner) => inner,
            Err(_) => Err(ToolError::Timeout(self.timeout.as_secs())),
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        audit(&action.tool, &action.args, result.is_ok(), outcome, elapsed);

        match result {
            Ok(output) => ToolReport::success(&action.tool, output),
            Err(e) => ToolReport::failure(&action.tool, e.error_type(), e.to_string()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn audit(tool: &str, args: &Map<String, Value>, ok: bool, outcome: &str, elapsed: Duration) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
