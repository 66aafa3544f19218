//! 流式回复转发
//!
//! Token 先进缓冲，每累计 flush_chars 个字符才整体编辑一次消息，避免逐 Token 调用平台接口；
//! 单条消息达到 max_message_chars 后另起一条新消息继续写。
//! 重试时按顺序复用已发出的消息；结束或失败时，本轮没用到的旧消息改写为占位符。

use crate::platform::{deliver, revise, MessageHandle, MessageSink, SinkError};

/// 本轮用不到的已发送消息被改写成的内容
pub const RETIRED_MESSAGE: &str = "…";

pub struct StreamRelay<'a, S: MessageSink + ?Sized> {
    sink: &'a S,
    channel_id: String,
    reply_to: Option<String>,
    flush_chars: usize,
    max_message_chars: usize,
    /// 已发出的全部消息，按顺序（第一条可能是状态消息）
    sent: Vec<MessageHandle>,
    /// 正在写入的消息在 sent 中的位置
    index: usize,
    /// 当前消息的完整内容
    buffer: String,
    buffer_chars: usize,
    /// 上次刷新后新增的字符数
    unflushed: usize,
    /// 本轮全部文本
    text: String,
}

impl<'a, S: MessageSink + ?Sized> StreamRelay<'a, S> {
    pub fn new(
        sink: &'a S,
        channel_id: impl Into<String>,
        flush_chars: usize,
        max_message_chars: usize,
    ) -> Self {
        Self {
            sink,
            channel_id: channel_id.into(),
            reply_to: None,
            flush_chars: flush_chars.max(1),
            max_message_chars: max_message_chars.max(1),
            sent: Vec::new(),
            index: 0,
            buffer: String::new(),
            buffer_chars: 0,
            unflushed: 0,
            text: String::new(),
        }
    }

    /// 首条新消息回复的目标
    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    /// 复用已有的状态消息作为第一条输出
    pub fn with_status(mut self, status: Option<MessageHandle>) -> Self {
        self.sent = status.into_iter().collect();
        self.index = 0;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub async fn push(&mut self, text: &str) -> Result<(), SinkError> {
        self.text.push_str(text);
        for c in text.chars() {
            if self.buffer_chars == self.max_message_chars {
                self.flush().await?;
                self.index += 1;
                self.buffer.clear();
                self.buffer_chars = 0;
            }
            self.buffer.push(c);
            self.buffer_chars += 1;
            self.unflushed += 1;
        }
        if self.unflushed >= self.flush_chars {
            self.flush().await?;
        }
        Ok(())
    }

    /// 把缓冲写到平台：已有消息则编辑（消息消失时改发新消息），否则发送
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        if self.unflushed == 0 || self.buffer.is_empty() {
            return Ok(());
        }
        match self.sent.get(self.index) {
            Some(handle) => {
                let handle = revise(self.sink, handle, &self.buffer).await?;
                self.sent[self.index] = handle;
            }
            None => {
                let reply_to = if self.sent.is_empty() { self.reply_to.as_deref() } else { None };
                let handle = deliver(self.sink, &self.channel_id, &self.buffer, reply_to).await?;
                self.sent.push(handle);
                self.index = self.sent.len() - 1;
            }
        }
        self.unflushed = 0;
        Ok(())
    }

    /// 结束本轮：刷新剩余缓冲，改写本轮未用到的旧消息，返回全文
    pub async fn finish(&mut self) -> Result<String, SinkError> {
        self.flush().await?;
        self.retire_unused().await;
        Ok(self.text.clone())
    }

    /// 上一轮滚动出的、本轮没写到的消息改为占位符；消息已消失则跳过
    async fn retire_unused(&mut self) {
        let used = if self.buffer.is_empty() { self.index } else { self.index + 1 };
        for handle in self.sent.iter().skip(used.max(1)) {
            if let Err(e) = self.sink.edit(handle, RETIRED_MESSAGE).await {
                tracing::debug!(message_id = %handle.message_id, error = %e, "Could not retire stale message");
            }
        }
    }

    /// 重试前清空：下一轮从第一条消息重新写起，后续消息按顺序复用
    pub fn reset(&mut self) {
        self.index = 0;
        self.buffer.clear();
        self.buffer_chars = 0;
        self.unflushed = 0;
        self.text.clear();
    }

    /// 以失败提示替换第一条消息内容，其余已发出的消息改为占位符
    pub async fn fail(&mut self, notice: &str) -> Result<(), SinkError> {
        self.reset();
        self.buffer.push_str(notice);
        self.buffer_chars = notice.chars().count();
        self.unflushed = self.buffer_chars;
        self.flush().await?;
        self.retire_unused().await;
        Ok(())
    }
}
