//! OpenAI 兼容 API 提供方
//!
//! 通过 async_openai 以流式方式调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 打开流与每个数据块都受 request_timeout 约束，超时以 LlmError::Timeout 返回，交给熔断器分类。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::time::timeout;

use super::traits::{ChunkStream, LlmError, ModelChunk, ModelProvider, ModelRequest};
use crate::memory::{Message, Role};

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    request_timeout: Duration,
}

impl OpenAiProvider {
    /// api_key 为 None 时读取 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, request_timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    messages
        .iter()
        .map(|m| {
            let built = match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::System),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::User),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map(ChatCompletionRequestMessage::Assistant),
            };
            built.map_err(|e| LlmError::InvalidRequest(e.to_string()))
        })
        .collect()
}

/// 保留原始错误文本（状态码、quota、not found 等）供分类
fn map_openai_error(error: OpenAIError) -> LlmError {
    let text = error.to_string();
    let lower = text.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::Timeout(text)
    } else if lower.contains("connect") || lower.contains("dns") {
        LlmError::Connection(text)
    } else {
        LlmError::Api {
            status: None,
            message: text,
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn invoke(&self, model: &str, request: &ModelRequest) -> Result<ChunkStream, LlmError> {
        let openai_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(to_openai_messages(&request.full_messages())?)
            .stream(true)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let idle = self.request_timeout;
        let inner = timeout(idle, self.client.chat().create_stream(openai_request))
            .await
            .map_err(|_| LlmError::Timeout(format!("opening stream for {model} exceeded {}s", idle.as_secs())))?
            .map_err(map_openai_error)?;

        // 每块都在 idle 内到达，否则以超时结束
        let chunks = stream::unfold(Some(inner), move |state| async move {
            let mut inner = state?;
            match timeout(idle, inner.next()).await {
                Ok(Some(Ok(response))) => {
                    let token = response
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.clone())
                        .filter(|t| !t.is_empty())
                        .map(ModelChunk::Token);
                    Some((Ok(token), Some(inner)))
                }
                Ok(Some(Err(e))) => Some((Err(map_openai_error(e)), None)),
                Ok(None) => None,
                Err(_) => Some((
                    Err(LlmError::Timeout(format!("no data for {}s", idle.as_secs()))),
                    None,
                )),
            }
        })
        .filter_map(|item: Result<Option<ModelChunk>, LlmError>| async move { item.transpose() });

        Ok(Box::pin(chunks))
    }
}
