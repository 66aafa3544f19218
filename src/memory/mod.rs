//! 记忆层：短期（频道消息窗口）、程序记忆（用户事实）、情景记忆（片段检索）与合成

pub mod composer;
pub mod conversation;
pub mod episodic;
pub mod procedural;
pub mod tokenizer;

use thiserror::Error;

pub use composer::{ComposedContext, MemoryComposer, MemorySnapshot};
pub use conversation::{ChatTurn, Message, Role};
pub use episodic::{EpisodicMemory, InMemoryEpisodic};
pub use procedural::{InMemoryProceduralStore, ProceduralStore, UserProfile};

/// 记忆读取失败；由 MemoryComposer 就地降级，不向上传播
#[derive(Error, Debug, Clone)]
pub enum MemoryError {
    #[error("short-term history unavailable: {0}")]
    History(String),

    #[error("procedural store error: {0}")]
    Procedural(String),

    #[error("episodic store error: {0}")]
    Episodic(String),
}
