//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__STREAM__FLUSH_CHARS=80`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load failed: {0}")]
    Load(#[from] config::ConfigError),

    /// 角色未配置任何模型
    #[error("no models configured for role '{0}'")]
    EmptyRole(String),
}

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub stream: StreamSection,
    pub pipeline: PipelineSection,
    pub tools: ToolsSection,
}

/// [models] 段：角色 → 按优先级排列的 `provider:model` 列表
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsSection {
    #[serde(default = "default_roles")]
    pub roles: HashMap<String, Vec<String>>,
}

pub const ROLE_ANALYSIS: &str = "analysis";
pub const ROLE_RESPONSE: &str = "response";

fn default_roles() -> HashMap<String, Vec<String>> {
    HashMap::from([
        (
            ROLE_ANALYSIS.to_string(),
            vec!["deepseek:deepseek-chat".into(), "openai:gpt-4o-mini".into()],
        ),
        (
            ROLE_RESPONSE.to_string(),
            vec!["deepseek:deepseek-chat".into(), "openai:gpt-4o-mini".into()],
        ),
    ])
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

impl ModelsSection {
    pub fn from_roles<I, R, M>(roles: I) -> Self
    where
        I: IntoIterator<Item = (R, Vec<M>)>,
        R: Into<String>,
        M: Into<String>,
    {
        Self {
            roles: roles
                .into_iter()
                .map(|(r, ms)| (r.into(), ms.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// 取角色的模型优先级列表；角色不存在或列表为空时返回 EmptyRole
    pub fn get_model_priority_list(&self, role: &str) -> Result<&[String], ConfigError> {
        match self.roles.get(role) {
            Some(list) if !list.is_empty() => Ok(list.as_slice()),
            _ => Err(ConfigError::EmptyRole(role.to_string())),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// [memory] 段：短期窗口大小与情景记忆
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// 取最近多少条频道消息作为短期记忆
    #[serde(default = "default_short_term_window")]
    pub short_term_window: usize,
    #[serde(default = "default_true")]
    pub episodic_enabled: bool,
    /// 情景记忆检索条数
    #[serde(default = "default_episodic_k")]
    pub episodic_k: usize,
}

fn default_short_term_window() -> usize {
    15
}

fn default_episodic_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            short_term_window: default_short_term_window(),
            episodic_enabled: true,
            episodic_k: default_episodic_k(),
        }
    }
}

/// [stream] 段：流式输出缓冲与单条消息长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// 缓冲满多少字符后 flush 一次（编辑消息）
    #[serde(default = "default_flush_chars")]
    pub flush_chars: usize,
    /// 单条消息最大字符数，超出后另起新消息
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_flush_chars() -> usize {
    40
}

fn default_max_message_chars() -> usize {
    2000
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            flush_chars: default_flush_chars(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// [pipeline] 段：回复阶段重试与机器人名
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 两次尝试之间的固定等待（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// 处理开始时发送的状态消息；为空则不发送
    #[serde(default = "default_status_text")]
    pub status_text: String,
    /// 全部尝试失败后展示给用户的提示
    #[serde(default = "default_failure_notice")]
    pub failure_notice: String,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_bot_name() -> String {
    "Hive".to_string()
}

fn default_status_text() -> String {
    "Thinking...".to_string()
}

fn default_failure_notice() -> String {
    "Sorry, I couldn't generate a reply right now. Please try again in a moment.".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            bot_name: default_bot_name(),
            status_text: default_status_text(),
            failure_notice: default_failure_notice(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.stream.flush_chars, 40);
        assert_eq!(cfg.pipeline.max_attempts, 3);
        assert_eq!(cfg.memory.short_term_window, 15);
        assert!(cfg.models.get_model_priority_list(ROLE_ANALYSIS).is_ok());
    }

    #[test]
    fn test_empty_role_is_error() {
        let models = ModelsSection::from_roles([("analysis", Vec::<String>::new())]);
        assert!(matches!(
            models.get_model_priority_list("analysis"),
            Err(ConfigError::EmptyRole(r)) if r == "analysis"
        ));
        assert!(models.get_model_priority_list("missing").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[models.roles]
analysis = ["mock:a", "mock:b"]
response = ["mock:c"]

[stream]
flush_chars = 10
"#
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(
            cfg.models.get_model_priority_list("analysis").unwrap(),
            &["mock:a".to_string(), "mock:b".to_string()]
        );
        assert_eq!(cfg.stream.flush_chars, 10);
        assert_eq!(cfg.stream.max_message_chars, 2000);
        assert_eq!(cfg.pipeline.retry_delay_ms, 1000);
    }
}
