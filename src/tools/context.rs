//! 工具执行上下文：一次请求内工具需要的协作者

use std::fmt;
use std::sync::Arc;

use crate::platform::{ChatPlatform, InboundMessage, MessageHandle};

/// 以引用传入每次工具调用；注册表本身从不修改它
#[derive(Clone)]
pub struct ToolExecutionContext {
    /// 聊天平台句柄
    pub platform: Arc<dyn ChatPlatform>,
    /// 触发本次请求的消息
    pub message: InboundMessage,
    /// 处理中的状态消息（流式回复写入的那条）
    pub status: Option<MessageHandle>,
    /// 请求级 tracing span，工具内日志应在其中记录
    pub span: tracing::Span,
}

impl ToolExecutionContext {
    pub fn new(platform: Arc<dyn ChatPlatform>, message: InboundMessage) -> Self {
        Self {
            platform,
            message,
            status: None,
            span: tracing::Span::current(),
        }
    }

    pub fn with_status(mut self, status: Option<MessageHandle>) -> Self {
        self.status = status;
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }
}

impl fmt::Debug for ToolExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolExecutionContext")
            .field("message_id", &self.message.id)
            .field("channel_id", &self.message.channel_id)
            .field("status", &self.status)
            .finish()
    }
}
