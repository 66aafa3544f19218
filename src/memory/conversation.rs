//! 短期记忆：对话轮次
//!
//! Message 是送入模型的原生对话轮次（role + content）；ChatTurn 是从频道历史取回的结构化记录，
//! 由编排器转换为 Message，保留角色结构而不是拍平成文本。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 频道历史中的一条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub is_bot: bool,
    pub content: String,
    #[serde(default)]
    pub reactions: Vec<String>,
    /// 被回复消息的 id
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// 转为模型输入：机器人自己的消息为 assistant，其余为带作者名前缀的 user
    pub fn to_message(&self) -> Message {
        if self.is_bot {
            return Message::assistant(self.content.clone());
        }
        let mut text = format!("{}: {}", self.author_name, self.content);
        if let Some(ref target) = self.reply_to {
            text.push_str(&format!(" (replying to {target})"));
        }
        if !self.reactions.is_empty() {
            text.push_str(&format!(" [reactions: {}]", self.reactions.join(" ")));
        }
        Message::user(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(is_bot: bool) -> ChatTurn {
        ChatTurn {
            message_id: "1".into(),
            author_id: "u1".into(),
            author_name: "alice".into(),
            is_bot,
            content: "hi there".into(),
            reactions: vec!["👍".into()],
            reply_to: Some("0".into()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_user_turn_keeps_author_and_annotations() {
        let m = turn(false).to_message();
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "alice: hi there (replying to 0) [reactions: 👍]");
    }

    #[test]
    fn test_bot_turn_is_assistant() {
        let m = turn(true).to_message();
        assert_eq!(m, Message::assistant("hi there"));
    }
}
