//! 聊天平台边界：消息出口（send/edit）、频道历史、表情回应、外部错误上报
//!
//! 编排核心只通过这里的 trait 访问平台；具体平台（Discord / 飞书等）在进程根部实现并注入。

pub mod in_memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::ChatTurn;

pub use in_memory::{InMemoryPlatform, RecordingReporter};

/// 平台错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// 目标消息已不存在（被删除 / 过期）
    #[error("message {0} no longer exists")]
    MessageGone(String),

    #[error("platform error: {0}")]
    Platform(String),
}

/// 消息作者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Author {
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
        }
    }

    pub fn bot(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: true,
        }
    }
}

/// 触发一次处理的入站消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub author: Author,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub reply_to: Option<String>,
}

impl InboundMessage {
    pub fn new(
        channel_id: impl Into<String>,
        author: Author,
        content: impl Into<String>,
    ) -> Self {
        let channel_id = channel_id.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_name: channel_id.clone(),
            channel_id,
            author,
            content: content.into(),
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 已发送消息的句柄，用于后续编辑
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

/// 消息出口
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// 发送新消息；reply_to 为被回复的消息 id
    async fn send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageHandle, SinkError>;

    /// 用新内容整体替换已发送消息
    async fn edit(&self, handle: &MessageHandle, content: &str) -> Result<(), SinkError>;
}

/// 频道历史返回顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    NewestFirst,
    OldestFirst,
}

/// 短期记忆来源：频道最近 N 条消息
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// 取 before（不含）之前的最近 limit 条；before 为 None 时从最新开始
    async fn recent(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<ChatTurn>, SinkError>;

    fn order(&self) -> HistoryOrder {
        HistoryOrder::NewestFirst
    }
}

/// 完整平台句柄（工具执行上下文中携带）
#[async_trait]
pub trait ChatPlatform: MessageSink + ChannelHistory {
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), SinkError>;
}

/// 发送消息；被回复的消息已不存在时退化为不带回复的普通消息
pub async fn deliver<S: MessageSink + ?Sized>(
    sink: &S,
    channel_id: &str,
    content: &str,
    reply_to: Option<&str>,
) -> Result<MessageHandle, SinkError> {
    match sink.send(channel_id, content, reply_to).await {
        Err(SinkError::MessageGone(id)) if reply_to.is_some() => {
            tracing::debug!(message_id = %id, "Reply target gone, sending standalone message");
            sink.send(channel_id, content, None).await
        }
        other => other,
    }
}

/// 编辑消息；原消息已不存在时改为发送新消息，返回最终有效的句柄
pub async fn revise<S: MessageSink + ?Sized>(
    sink: &S,
    handle: &MessageHandle,
    content: &str,
) -> Result<MessageHandle, SinkError> {
    match sink.edit(handle, content).await {
        Ok(()) => Ok(handle.clone()),
        Err(SinkError::MessageGone(id)) => {
            tracing::debug!(message_id = %id, "Edited message gone, sending a new one");
            sink.send(&handle.channel_id, content, None).await
        }
        Err(e) => Err(e),
    }
}

/// 外部错误上报（完整诊断信息只进这里，不展示给用户）
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static));
}

/// 默认上报：写 tracing error 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(context = %context, error = %error, debug = ?error, "Reported error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revise_falls_back_to_send_when_gone() {
        let platform = InMemoryPlatform::new();
        let handle = platform.send("c1", "hello", None).await.unwrap();
        platform.delete_message(&handle);

        let new_handle = revise(&platform, &handle, "hello again").await.unwrap();
        assert_ne!(new_handle, handle);
        let msgs = platform.bot_messages("c1");
        assert_eq!(msgs, vec!["hello again".to_string()]);
    }

    #[tokio::test]
    async fn test_deliver_drops_missing_reply_target() {
        let platform = InMemoryPlatform::new();
        let handle = deliver(&platform, "c1", "hi", Some("nope")).await.unwrap();
        assert_eq!(handle.channel_id, "c1");
        assert_eq!(platform.bot_messages("c1"), vec!["hi".to_string()]);
    }
}
