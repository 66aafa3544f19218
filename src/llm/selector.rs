//! 模型选择：角色优先级列表 × 熔断器 × 提供方注册表
//!
//! 模型标识为 `provider:model`。open_stream 按优先级依次尝试：冷却中的模型直接跳过（不计入失败），
//! 打开流失败的模型记入熔断器并继续下一个；全部不可用时返回 Exhausted。
//! 回复阶段重试时可指定上次中途断流的模型：列表中已无其他可用模型时忽略其冷却再调用一次。

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::circuit_breaker::CircuitBreaker;
use super::classifier::{categorize, ErrorCategory};
use super::traits::{ChunkStream, LlmError, ModelProvider, ModelRequest};
use crate::config::{ConfigError, ModelsSection};

/// 一次失败尝试（用于事件与诊断）
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model: String,
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 列表中的模型均在冷却或本次全部失败
    #[error("no model available for role '{role}' ({} failed, {skipped} cooling down)", failures.len())]
    Exhausted {
        role: String,
        failures: Vec<ModelFailure>,
        skipped: usize,
    },
}

/// 成功打开的流
pub struct OpenedStream {
    pub model: String,
    pub stream: ChunkStream,
    /// 本次选择过程中先行失败的模型
    pub failures: Vec<ModelFailure>,
}

/// `openai:gpt-4o-mini` → ("openai", "gpt-4o-mini")；无前缀时 provider 为空
pub fn split_identifier(id: &str) -> (&str, &str) {
    id.split_once(':').unwrap_or(("", id))
}

pub struct ModelSelector {
    models: ModelsSection,
    breaker: Arc<CircuitBreaker>,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ModelSelector {
    pub fn new(models: ModelsSection, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            models,
            breaker,
            providers: HashMap::new(),
        }
    }

    /// 注册提供方（按标识前缀匹配）
    pub fn with_provider(mut self, prefix: impl Into<String>, provider: Arc<dyn ModelProvider>) -> Self {
        self.register_provider(prefix, provider);
        self
    }

    pub fn register_provider(&mut self, prefix: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(prefix.into(), provider);
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn priority_list(&self, role: &str) -> Result<&[String], ConfigError> {
        self.models.get_model_priority_list(role)
    }

    /// 为角色打开一条流，必要时沿优先级列表回退
    pub async fn open_stream(
        &self,
        role: &str,
        request: &ModelRequest,
    ) -> Result<OpenedStream, SelectionError> {
        self.open_stream_retrying(role, request, None).await
    }

    /// 重试用：按优先级正常选择；若其余模型都不可用，则忽略冷却重新调用上次中途断流的 retry 模型
    pub async fn open_stream_retrying(
        &self,
        role: &str,
        request: &ModelRequest,
        retry: Option<&str>,
    ) -> Result<OpenedStream, SelectionError> {
        let candidates = self.models.get_model_priority_list(role)?;
        let mut failures = Vec::new();
        let mut cooling: Vec<&str> = Vec::new();

        for model in candidates {
            if !self.breaker.is_available(model) {
                tracing::debug!(role = %role, model = %model, "Skipping model in cooldown");
                cooling.push(model);
                continue;
            }
            match self.invoke(model, request).await {
                Ok(stream) => {
                    tracing::info!(role = %role, model = %model, "Model selected");
                    return Ok(OpenedStream {
                        model: model.clone(),
                        stream,
                        failures,
                    });
                }
                Err(failure) => failures.push(failure),
            }
        }

        if let Some(model) = retry.filter(|m| cooling.contains(m)) {
            tracing::info!(role = %role, model = %model, "Retrying interrupted model despite cooldown");
            match self.invoke(model, request).await {
                Ok(stream) => {
                    return Ok(OpenedStream {
                        model: model.to_string(),
                        stream,
                        failures,
                    })
                }
                Err(failure) => {
                    failures.push(failure);
                    cooling.retain(|m| *m != model);
                }
            }
        }

        Err(SelectionError::Exhausted {
            role: role.to_string(),
            failures,
            skipped: cooling.len(),
        })
    }

    /// 调用单个模型；打开失败时记入熔断器
    async fn invoke(&self, model: &str, request: &ModelRequest) -> Result<ChunkStream, ModelFailure> {
        let (prefix, name) = split_identifier(model);
        let Some(provider) = self.providers.get(prefix) else {
            let err = LlmError::UnknownProvider(model.to_string());
            return Err(self.record_with(model, &err, Some(ErrorCategory::ModelNotFound)));
        };
        provider
            .invoke(name, request)
            .await
            .map_err(|err| self.record_with(model, &err, None))
    }

    /// 流建立后的失败（如中途断流）同样记入熔断器
    pub fn record_failure(&self, model: &str, error: &LlmError) -> ModelFailure {
        self.record_with(model, error, None)
    }

    fn record_with(&self, model: &str, error: &LlmError, category: Option<ErrorCategory>) -> ModelFailure {
        let category = category.unwrap_or_else(|| categorize(error));
        let record = self.breaker.record_failure(model, error, Some(category));
        ModelFailure {
            model: model.to_string(),
            category,
            message: record.message,
        }
    }
}
