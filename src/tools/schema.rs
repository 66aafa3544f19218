//! 动作行 JSON Schema 生成
//!
//! 用于把「合法 ACTION 行」的 JSON 结构注入 system prompt，减少模型输出格式错误。

use schemars::schema_for;

use super::ActionRequest;

/// 返回 ActionRequest 的 JSON Schema 字符串
pub fn action_schema_json() -> String {
    let schema = schema_for!(ActionRequest);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
