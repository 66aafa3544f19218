//! Mock 提供方（用于测试与离线运行，无需 API）
//!
//! 按模型名排队脚本化步骤：正常输出、打开即失败、输出若干块后中途断流。
//! 没有脚本时回显最后一条用户消息。记录每个模型的调用次数与收到的请求。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use super::traits::{ChunkStream, LlmError, ModelChunk, ModelProvider, ModelRequest};
use crate::memory::Role;
use crate::tools::ActionRequest;

/// 单次调用的脚本
#[derive(Debug, Clone)]
pub enum MockStep {
    /// 依次输出这些块后正常结束
    Reply(Vec<ModelChunk>),
    /// invoke 直接返回错误
    Fail(LlmError),
    /// 输出 chunks 后以 error 中断
    FailMidStream { chunks: Vec<ModelChunk>, error: LlmError },
}

impl MockStep {
    /// 整段文本作为一个 Token
    pub fn text(text: impl Into<String>) -> Self {
        MockStep::Reply(vec![ModelChunk::Token(text.into())])
    }

    /// 多个 Token
    pub fn tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        MockStep::Reply(
            tokens
                .iter()
                .map(|t| ModelChunk::Token(t.as_ref().to_string()))
                .collect(),
        )
    }

    /// 结构化工具调用
    pub fn tool_call(action: ActionRequest) -> Self {
        MockStep::Reply(vec![ModelChunk::ToolCall(action)])
    }
}

#[derive(Debug, Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<String, VecDeque<MockStep>>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<(String, ModelRequest)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为模型追加一步脚本（model 为去掉 `mock:` 前缀后的名字）
    pub fn push(&self, model: &str, step: MockStep) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn calls(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).values().sum()
    }

    /// 收到的全部请求（按调用顺序）
    pub fn requests(&self) -> Vec<(String, ModelRequest)> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next_step(&self, model: &str) -> Option<MockStep> {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(model)
            .and_then(VecDeque::pop_front)
    }
}

fn echo(request: &ModelRequest) -> MockStep {
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)");
    let words: Vec<String> = format!("Echo from Mock: {last_user}")
        .split_inclusive(' ')
        .map(String::from)
        .collect();
    MockStep::tokens(&words)
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn invoke(&self, model: &str, request: &ModelRequest) -> Result<ChunkStream, LlmError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_default() += 1;
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((model.to_string(), request.clone()));

        let step = self.next_step(model).unwrap_or_else(|| echo(request));
        match step {
            MockStep::Reply(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok)))),
            MockStep::Fail(error) => Err(error),
            MockStep::FailMidStream { chunks, error } => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(Ok).chain(std::iter::once(Err(error))),
            ))),
        }
    }
}
