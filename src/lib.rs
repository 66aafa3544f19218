//! Hive - 聊天机器人的模型编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 请求状态机、错误、两阶段编排器
//! - **llm**: 模型提供方（OpenAI 兼容 / DeepSeek / Mock）、错误分类、熔断、模型选择
//! - **memory**: 短期窗口、程序记忆、情景记忆与合成
//! - **observability**: tracing 初始化
//! - **pipeline**: 动作行解析、提示词、流式转发、过程事件
//! - **platform**: 聊天平台边界（消息出口、频道历史、错误上报）与进程内实现
//! - **tools**: 工具目录、函数式注册、执行器与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod platform;
pub mod tools;
