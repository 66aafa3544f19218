//! 两阶段的固定指令与 system prompt 拼装

use crate::tools::{action_schema_json, ToolCatalog};

const ANALYSIS_INSTRUCTIONS: &str = "\
You are the analysis stage of a chat assistant named {bot}. Do not write the reply to the user.
Read the conversation and the system context, then decide whether any of the lookup tools below
would help answer the latest message.
- If a tool is needed, output one line per call, exactly in the form
  ACTION: {\"tool\": \"<name>\", \"args\": {...}}
  and nothing after the last ACTION line. Lookups end this stage immediately.
- Otherwise output a short analysis: what the user wants, relevant facts from memory,
  and what the reply should cover.";

const RESPONSE_INSTRUCTIONS: &str = "\
You are {bot}, a helpful chat assistant. Write the reply to the latest message directly,
in the user's language, using the system context and the analysis below.
Never mention the analysis stage or tools by name.";

const ACTION_TOOLS_NOTE: &str = "\
You may additionally perform side effects with the tools below. To do so, put each call on its own line:
  ACTION: {\"tool\": \"<name>\", \"args\": {...}}
These lines are hidden from the user and run after your reply; their results are not shown to you.";

fn tools_block(catalog: &ToolCatalog) -> String {
    format!(
        "Available tools:\n{}\n\nAction line JSON schema:\n{}",
        catalog.prompt_description(),
        action_schema_json()
    )
}

/// 分析阶段 system prompt：固定指令 + 记忆上下文 + 调查类工具
pub fn analysis_prompt(bot_name: &str, context: &str, catalog: &ToolCatalog) -> String {
    let mut out = ANALYSIS_INSTRUCTIONS.replace("{bot}", bot_name);
    if !catalog.is_empty() {
        out.push_str("\n\n");
        out.push_str(&tools_block(catalog));
    }
    out.push_str("\n\n");
    out.push_str(context);
    out
}

/// 回复阶段 system prompt：固定指令 + 记忆上下文 + 分析结果 + 动作类工具
pub fn response_prompt(bot_name: &str, context: &str, analysis: &str, catalog: &ToolCatalog) -> String {
    let mut out = RESPONSE_INSTRUCTIONS.replace("{bot}", bot_name);
    if !catalog.is_empty() {
        out.push_str("\n\n");
        out.push_str(ACTION_TOOLS_NOTE);
        out.push('\n');
        out.push_str(&tools_block(catalog));
    }
    out.push_str("\n\n");
    out.push_str(context);
    if !analysis.trim().is_empty() {
        out.push_str("\n\n--- Analysis ---\n");
        out.push_str(analysis.trim());
        out.push_str("\n--- End Analysis ---");
    }
    out
}
