//! 进程内平台实现：单机运行与测试用
//!
//! 按频道保存消息列表，记录每次 send/edit，可模拟消息被删除与历史读取失败。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{Author, ChannelHistory, ChatPlatform, ErrorReporter, MessageHandle, MessageSink, SinkError};
use crate::memory::ChatTurn;

#[derive(Default)]
pub struct InMemoryPlatform {
    channels: Mutex<HashMap<String, Vec<ChatTurn>>>,
    next_id: AtomicUsize,
    edits: AtomicUsize,
    fail_history: AtomicBool,
    bot: Option<Author>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定机器人身份（其发送的消息在历史中标记为 is_bot）
    pub fn with_bot(mut self, bot: Author) -> Self {
        self.bot = Some(bot);
        self
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<ChatTurn>>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_message_id(&self) -> String {
        format!("m{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// 追加一条用户消息到频道历史，返回其 id
    pub fn push_message(
        &self,
        channel_id: &str,
        author: Author,
        content: impl Into<String>,
    ) -> String {
        let id = self.next_message_id();
        self.channels()
            .entry(channel_id.to_string())
            .or_default()
            .push(ChatTurn {
                message_id: id.clone(),
                author_id: author.id,
                author_name: author.name,
                is_bot: author.is_bot,
                content: content.into(),
                reactions: Vec::new(),
                reply_to: None,
                timestamp: Utc::now(),
            });
        id
    }

    /// 模拟消息被删除
    pub fn delete_message(&self, handle: &MessageHandle) {
        if let Some(list) = self.channels().get_mut(&handle.channel_id) {
            list.retain(|t| t.message_id != handle.message_id);
        }
    }

    pub fn set_history_failure(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::Relaxed);
    }

    /// 频道内机器人发送的消息内容（按发送顺序）
    pub fn bot_messages(&self, channel_id: &str) -> Vec<String> {
        self.channels()
            .get(channel_id)
            .map(|list| {
                list.iter()
                    .filter(|t| t.is_bot)
                    .map(|t| t.content.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn message(&self, handle: &MessageHandle) -> Option<ChatTurn> {
        self.channels()
            .get(&handle.channel_id)
            .and_then(|list| list.iter().find(|t| t.message_id == handle.message_id).cloned())
    }

    pub fn reactions(&self, channel_id: &str, message_id: &str) -> Vec<String> {
        self.channels()
            .get(channel_id)
            .and_then(|list| list.iter().find(|t| t.message_id == message_id))
            .map(|t| t.reactions.clone())
            .unwrap_or_default()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageSink for InMemoryPlatform {
    async fn send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageHandle, SinkError> {
        let mut channels = self.channels();
        let list = channels.entry(channel_id.to_string()).or_default();
        if let Some(target) = reply_to {
            if !list.iter().any(|t| t.message_id == target) {
                return Err(SinkError::MessageGone(target.to_string()));
            }
        }
        let (author_id, author_name) = match self.bot {
            Some(ref b) => (b.id.clone(), b.name.clone()),
            None => ("bot".to_string(), "bot".to_string()),
        };
        let id = self.next_message_id();
        list.push(ChatTurn {
            message_id: id.clone(),
            author_id,
            author_name,
            is_bot: true,
            content: content.to_string(),
            reactions: Vec::new(),
            reply_to: reply_to.map(String::from),
            timestamp: Utc::now(),
        });
        Ok(MessageHandle {
            channel_id: channel_id.to_string(),
            message_id: id,
        })
    }

    async fn edit(&self, handle: &MessageHandle, content: &str) -> Result<(), SinkError> {
        let mut channels = self.channels();
        let turn = channels
            .get_mut(&handle.channel_id)
            .and_then(|list| list.iter_mut().find(|t| t.message_id == handle.message_id))
            .ok_or_else(|| SinkError::MessageGone(handle.message_id.clone()))?;
        turn.content = content.to_string();
        self.edits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl ChannelHistory for InMemoryPlatform {
    /// 新 → 旧
    async fn recent(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<ChatTurn>, SinkError> {
        if self.fail_history.load(Ordering::Relaxed) {
            return Err(SinkError::Platform("history unavailable".to_string()));
        }
        let channels = self.channels();
        let Some(list) = channels.get(channel_id) else {
            return Ok(Vec::new());
        };
        let end = before
            .and_then(|id| list.iter().position(|t| t.message_id == id))
            .unwrap_or(list.len());
        Ok(list[..end].iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl ChatPlatform for InMemoryPlatform {
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), SinkError> {
        let mut channels = self.channels();
        let turn = channels
            .get_mut(channel_id)
            .and_then(|list| list.iter_mut().find(|t| t.message_id == message_id))
            .ok_or_else(|| SinkError::MessageGone(message_id.to_string()))?;
        if !turn.reactions.iter().any(|r| r == emoji) {
            turn.reactions.push(emoji.to_string());
        }
        Ok(())
    }
}

/// 记录所有上报的错误（context, 错误文本），测试断言用
#[derive(Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::debug!(context = %context, error = %error, "Recorded error report");
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((context.to_string(), error.to_string()));
    }
}
