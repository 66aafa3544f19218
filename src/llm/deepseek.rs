//! DeepSeek 提供方（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)
//! - 标识示例: `deepseek:deepseek-chat`

use super::OpenAiProvider;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 提供方；密钥优先取 `DEEPSEEK_API_KEY`，否则回退 `OPENAI_API_KEY`
pub fn create_deepseek_provider(request_timeout_secs: u64) -> OpenAiProvider {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    OpenAiProvider::new(Some(DEEPSEEK_BASE_URL), api_key.as_deref(), request_timeout_secs)
}
