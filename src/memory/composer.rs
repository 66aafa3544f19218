//! 记忆合成：短期（频道最近消息窗口）+ 程序记忆（按用户持久化事实）+ 可选情景记忆
//!
//! 每一步单独容错：失败上报给 ErrorReporter 并以空值替代，绝不让整个请求失败。
//! 短期轮次不写进 system context 文本，而是单独返回，由调用方作为原生对话轮次注入模型；
//! 情景片段若包含窗口内某条消息的原文也会被丢弃，避免短期内容经由情景记忆进入 context。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use super::{ChatTurn, EpisodicMemory, MemoryError, ProceduralStore, UserProfile};
use crate::platform::{ChannelHistory, ErrorReporter, HistoryOrder, InboundMessage};

pub const CONTEXT_HEADER: &str = "--- System Context ---";
pub const CONTEXT_FOOTER: &str = "--- End System Context ---";

/// 单次请求的记忆快照；每次请求重新构建，不跨请求缓存
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    /// 旧 → 新
    pub short_term: Vec<ChatTurn>,
    pub procedural: HashMap<String, UserProfile>,
    pub episodic: Vec<String>,
}

/// get_context 的结果
#[derive(Debug, Clone, Default)]
pub struct ComposedContext {
    /// `--- System Context --- ... --- End System Context ---` 文本块
    pub procedural_text: String,
    /// 旧 → 新的短期轮次
    pub short_term: Vec<ChatTurn>,
}

pub struct MemoryComposer {
    history: Arc<dyn ChannelHistory>,
    procedural: Arc<dyn ProceduralStore>,
    episodic: Option<Arc<dyn EpisodicMemory>>,
    reporter: Arc<dyn ErrorReporter>,
    window: usize,
    episodic_k: usize,
}

impl MemoryComposer {
    pub fn new(
        history: Arc<dyn ChannelHistory>,
        procedural: Arc<dyn ProceduralStore>,
        reporter: Arc<dyn ErrorReporter>,
        window: usize,
    ) -> Self {
        Self {
            history,
            procedural,
            episodic: None,
            reporter,
            window,
            episodic_k: 3,
        }
    }

    pub fn with_episodic(mut self, episodic: Arc<dyn EpisodicMemory>, k: usize) -> Self {
        self.episodic = Some(episodic);
        self.episodic_k = k;
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 合成上下文：返回 (system context 文本, 短期轮次)
    pub async fn get_context(&self, message: &InboundMessage) -> ComposedContext {
        let snapshot = self.snapshot(message).await;
        let procedural_text = render_context(message, &snapshot);
        ComposedContext {
            procedural_text,
            short_term: snapshot.short_term,
        }
    }

    /// 构建记忆快照（各步骤独立降级）
    pub async fn snapshot(&self, message: &InboundMessage) -> MemorySnapshot {
        let short_term = match self.fetch_short_term(message).await {
            Ok(turns) => turns,
            Err(e) => {
                self.reporter.report("memory.short_term", &e);
                Vec::new()
            }
        };

        let user_ids = referenced_users(&short_term, message);
        let procedural = match self.procedural.fetch(&user_ids).await {
            Ok(p) => p,
            Err(e) => {
                self.reporter.report("memory.procedural", &e);
                HashMap::new()
            }
        };

        let episodic = match self.episodic {
            Some(ref store) => match store.search(&message.content, self.episodic_k) {
                Ok(fragments) => outside_window(fragments, &short_term),
                Err(e) => {
                    self.reporter.report("memory.episodic", &e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        tracing::debug!(
            short_term = short_term.len(),
            users = procedural.len(),
            episodic = episodic.len(),
            "Memory snapshot built"
        );

        MemorySnapshot {
            short_term,
            procedural,
            episodic,
        }
    }

    async fn fetch_short_term(&self, message: &InboundMessage) -> Result<Vec<ChatTurn>, MemoryError> {
        if self.window == 0 {
            return Ok(Vec::new());
        }
        let mut turns = self
            .history
            .recent(&message.channel_id, self.window, Some(&message.id))
            .await
            .map_err(|e| MemoryError::History(e.to_string()))?;
        if self.history.order() == HistoryOrder::NewestFirst {
            turns.reverse();
        }
        // 来源返回超过窗口时只保留最近的 window 条
        if turns.len() > self.window {
            turns.drain(..turns.len() - self.window);
        }
        Ok(turns)
    }

    /// 把一次完成的回复写入情景记忆
    pub fn remember_exchange(&self, message: &InboundMessage, reply: &str) {
        if let Some(ref store) = self.episodic {
            if !reply.trim().is_empty() {
                store.add(&format!("{} asked: {} | replied: {}", message.author.name, message.content, reply));
            }
        }
    }
}

/// 丢弃包含窗口内任一轮次原文的片段
fn outside_window(fragments: Vec<String>, turns: &[ChatTurn]) -> Vec<String> {
    let window: Vec<&str> = turns
        .iter()
        .map(|t| t.content.trim())
        .filter(|c| !c.is_empty())
        .collect();
    fragments
        .into_iter()
        .filter(|f| !window.iter().any(|c| f.contains(c)))
        .collect()
}

/// 窗口内出现过的非机器人用户 + 当前作者（保持首次出现顺序，去重）
fn referenced_users(turns: &[ChatTurn], message: &InboundMessage) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let authors = turns
        .iter()
        .filter(|t| !t.is_bot)
        .map(|t| t.author_id.as_str())
        .chain(std::iter::once(message.author.id.as_str()));
    for id in authors {
        if seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    ids
}

fn render_context(message: &InboundMessage, snapshot: &MemorySnapshot) -> String {
    let mut out = String::new();
    out.push_str(CONTEXT_HEADER);
    out.push('\n');
    out.push_str(&format!("Channel: #{}\n", message.channel_name));
    out.push_str(&format!(
        "Current time: {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Current user: {} (id {})\n",
        message.author.name, message.author.id
    ));

    if !snapshot.procedural.is_empty() {
        out.push_str("\nUser memory:\n");
        let mut ids: Vec<&String> = snapshot.procedural.keys().collect();
        ids.sort();
        for id in ids {
            out.push_str(&snapshot.procedural[id].render(id));
            out.push('\n');
        }
    }

    if !snapshot.episodic.is_empty() {
        out.push_str("\nRelevant memories:\n");
        for fragment in &snapshot.episodic {
            out.push_str(&format!("- {}\n", fragment));
        }
    }

    out.push_str(CONTEXT_FOOTER);
    out
}
