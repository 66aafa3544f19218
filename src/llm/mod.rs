//! LLM 层：提供方抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、错误分类、熔断与模型选择

pub mod circuit_breaker;
pub mod classifier;
pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod selector;
pub mod traits;

pub use circuit_breaker::{CircuitBreaker, Clock, FailureRecord, ManualClock, SystemClock};
pub use classifier::{categorize, categorize_message, ErrorCategory};
pub use deepseek::{create_deepseek_provider, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockProvider, MockStep};
pub use openai::OpenAiProvider;
pub use selector::{split_identifier, ModelFailure, ModelSelector, OpenedStream, SelectionError};
pub use traits::{ChunkStream, LlmError, ModelChunk, ModelProvider, ModelRequest};
