//! 模型提供方抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 ModelProvider：按 model 名发起一次调用，返回流式 ModelChunk。
//! 调用失败必须返回携带足够信号（状态码、quota、not found 等）的 LlmError，供熔断器分类。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ActionRequest;

/// 模型调用错误；Display 文本即分类器的输入
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 提供方返回的 API 错误（status 为 HTTP 状态码，若可得）
    #[error("API error{}: {message}", fmt_status(.status))]
    Api { status: Option<u16>, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unknown provider for model identifier '{0}' (not found)")]
    UnknownProvider(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl LlmError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            message: message.into(),
        }
    }
}

/// 流式输出的一段：普通文本 Token，或结构化工具调用（支持原生 tool calling 的后端）
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    Token(String),
    ToolCall(ActionRequest),
}

/// 一次模型调用的输入：system prompt、对话轮次、可用工具 schema
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    /// 结构化工具描述（ToolCatalog::schema 输出）；不支持 tool calling 的后端可忽略
    pub tools: Vec<Value>,
}

impl ModelRequest {
    /// 拼成完整消息序列：system 在前，其余按原顺序
    pub fn full_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(Message::system(self.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, LlmError>> + Send>>;

/// 模型提供方：`model` 为去掉 provider 前缀后的模型名
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn invoke(&self, model: &str, request: &ModelRequest) -> Result<ChunkStream, LlmError>;
}
