//! 动作行协议：从模型文本中提取工具调用
//!
//! 不支持原生 tool calling 的模型以独占一行的 `ACTION: {"tool": "...", "args": {...}}` 请求工具。
//! parse_actions 处理完整文本；ActionSplitter 处理流式 Token，把动作行从用户可见文本中剥离。

use crate::tools::ActionRequest;

pub const ACTION_PREFIX: &str = "ACTION:";

/// 解析单行；不是动作行返回 None，动作行 JSON 非法返回 Some(Err)
pub fn parse_action_line(line: &str) -> Option<Result<ActionRequest, serde_json::Error>> {
    let rest = line.trim().strip_prefix(ACTION_PREFIX)?;
    Some(serde_json::from_str(rest.trim()))
}

/// 完整文本 → (可见文本, 动作列表)
///
/// 没有动作行时，若整段输出本身是 `{"tool": ...}` JSON（可带 ```json 围栏），也视为一个动作。
pub fn parse_actions(output: &str) -> (String, Vec<ActionRequest>) {
    let mut visible = Vec::new();
    let mut actions = Vec::new();
    for line in output.lines() {
        match parse_action_line(line) {
            Some(Ok(action)) => actions.push(action),
            Some(Err(e)) => tracing::warn!(line = %line, error = %e, "Malformed action line dropped"),
            None => visible.push(line),
        }
    }
    let visible = visible.join("\n").trim().to_string();

    if actions.is_empty() {
        if let Some(action) = bare_json_action(&visible) {
            return (String::new(), vec![action]);
        }
    }
    (visible, actions)
}

fn bare_json_action(text: &str) -> Option<ActionRequest> {
    let trimmed = text.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed
    } else {
        return None;
    };
    serde_json::from_str::<ActionRequest>(json_str)
        .ok()
        .filter(|a| !a.tool.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    /// 行首，尚不能判断是否为动作行
    Undecided,
    Visible,
    Action,
}

/// 流式剥离动作行
///
/// 普通文本最多被延迟「一个可能是 ACTION: 前缀的行首片段」；一旦确定不是动作行立即放行。
#[derive(Debug)]
pub struct ActionSplitter {
    state: LineState,
    line: String,
    actions: Vec<ActionRequest>,
}

impl Default for ActionSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSplitter {
    pub fn new() -> Self {
        Self {
            state: LineState::Undecided,
            line: String::new(),
            actions: Vec::new(),
        }
    }

    /// 输入一个 Token，返回现在可以展示的文本
    pub fn push(&mut self, token: &str) -> String {
        let mut out = String::new();
        for c in token.chars() {
            match self.state {
                LineState::Visible => {
                    out.push(c);
                    if c == '\n' {
                        self.state = LineState::Undecided;
                    }
                }
                LineState::Action => {
                    if c == '\n' {
                        self.close_action();
                    } else {
                        self.line.push(c);
                    }
                }
                LineState::Undecided => {
                    self.line.push(c);
                    if c == '\n' {
                        out.push_str(&self.line);
                        self.line.clear();
                        continue;
                    }
                    let head = self.line.trim_start();
                    if head.is_empty() || ACTION_PREFIX.starts_with(head) {
                        continue;
                    }
                    if head.starts_with(ACTION_PREFIX) {
                        self.state = LineState::Action;
                    } else {
                        out.push_str(&self.line);
                        self.line.clear();
                        self.state = LineState::Visible;
                    }
                }
            }
        }
        out
    }

    /// 流结束：收尾未完成的行，返回剩余可见文本
    pub fn finish(&mut self) -> String {
        let out = match self.state {
            LineState::Action => {
                self.close_action();
                String::new()
            }
            _ => std::mem::take(&mut self.line),
        };
        self.state = LineState::Undecided;
        out
    }

    /// 结构化 tool call 直接加入
    pub fn push_action(&mut self, action: ActionRequest) {
        self.actions.push(action);
    }

    pub fn take_actions(&mut self) -> Vec<ActionRequest> {
        std::mem::take(&mut self.actions)
    }

    fn close_action(&mut self) {
        let line = std::mem::take(&mut self.line);
        match parse_action_line(&line) {
            Some(Ok(action)) => self.actions.push(action),
            Some(Err(e)) => tracing::warn!(line = %line, error = %e, "Malformed action line dropped"),
            None => {}
        }
        self.state = LineState::Undecided;
    }
}
