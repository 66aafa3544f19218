//! 模型调用错误分类
//!
//! 按错误文本中的状态码与关键词把任意错误归入固定类别，每个类别对应一个基础冷却时长。
//! 分类是尽力而为的，永不失败：无法识别时归为 Unknown。

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 错误类别（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// 配额耗尽（含按天计的 429）
    QuotaExhausted,
    /// 模型不存在 / 404
    ModelNotFound,
    /// 短期限流
    RateLimited,
    /// 401 / 403
    AuthenticationFailure,
    /// 超时、连接中断、5xx
    Transient,
    Unknown,
}

impl ErrorCategory {
    /// 基础冷却时长（秒）
    pub const fn base_cooldown_secs(self) -> u64 {
        match self {
            ErrorCategory::QuotaExhausted => 120,
            ErrorCategory::ModelNotFound => 3600,
            ErrorCategory::RateLimited => 30,
            ErrorCategory::AuthenticationFailure => 7200,
            ErrorCategory::Transient => 10,
            ErrorCategory::Unknown => 60,
        }
    }

    pub fn base_cooldown(self) -> Duration {
        Duration::from_secs(self.base_cooldown_secs())
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::QuotaExhausted => "quota_exhausted",
            ErrorCategory::ModelNotFound => "model_not_found",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::AuthenticationFailure => "authentication_failure",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

const DAILY_MARKERS: &[&str] = &["daily", "per day", "perday", "per-day"];
const QUOTA_MARKERS: &[&str] = &["quota", "resource_exhausted", "resource exhausted", "insufficient_quota"];
const RATE_MARKERS: &[&str] = &["429", "rate limit", "rate_limit", "ratelimit", "too many requests"];
const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "unauthorised",
    "forbidden",
    "permission denied",
    "invalid api key",
    "invalid_api_key",
    "authentication",
];
const NOT_FOUND_MARKERS: &[&str] = &["404", "not found", "not_found", "does not exist", "no such model"];
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection",
    "connect error",
    "error sending request",
    "broken pipe",
    "reset by peer",
    "stream interrupted",
    "temporarily unavailable",
    "service unavailable",
    "overloaded",
    "500",
    "502",
    "503",
    "504",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// 对错误文本分类（大小写不敏感）
///
/// 判定顺序：配额 → 限流 → 鉴权 → 不存在 → 瞬时错误 → Unknown。
/// 429 默认视为短期限流，但若文本同时出现 daily / per day 等按天计的限额措辞，则视为配额耗尽。
pub fn categorize_message(message: &str) -> ErrorCategory {
    let text = message.to_lowercase();

    if contains_any(&text, QUOTA_MARKERS) {
        return ErrorCategory::QuotaExhausted;
    }
    if contains_any(&text, RATE_MARKERS) {
        if contains_any(&text, DAILY_MARKERS) {
            return ErrorCategory::QuotaExhausted;
        }
        return ErrorCategory::RateLimited;
    }
    if contains_any(&text, AUTH_MARKERS) {
        return ErrorCategory::AuthenticationFailure;
    }
    if contains_any(&text, NOT_FOUND_MARKERS) {
        return ErrorCategory::ModelNotFound;
    }
    if contains_any(&text, TRANSIENT_MARKERS) {
        return ErrorCategory::Transient;
    }
    ErrorCategory::Unknown
}

/// 对任意错误分类：检查 Display 文本与 Debug 文本（Debug 通常带类型名，如 `Timeout(..)`）
pub fn categorize(error: &(dyn std::error::Error + 'static)) -> ErrorCategory {
    let by_message = categorize_message(&error.to_string());
    if by_message != ErrorCategory::Unknown {
        return by_message;
    }
    let mut source = error.source();
    while let Some(inner) = source {
        let category = categorize_message(&inner.to_string());
        if category != ErrorCategory::Unknown {
            return category;
        }
        source = inner.source();
    }
    categorize_message(&format!("{error:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_daily_429_is_quota() {
        assert_eq!(
            categorize_message("HTTP 429: daily request limit reached"),
            ErrorCategory::QuotaExhausted
        );
        assert_eq!(
            categorize_message("429 Too Many Requests (requests per day)"),
            ErrorCategory::QuotaExhausted
        );
    }

    #[test]
    fn test_plain_429_is_rate_limited() {
        assert_eq!(
            categorize_message("status 429: slow down"),
            ErrorCategory::RateLimited
        );
    }

    #[test]
    fn test_quota_keyword() {
        assert_eq!(
            categorize_message("You exceeded your current quota"),
            ErrorCategory::QuotaExhausted
        );
    }

    #[test]
    fn test_not_found_and_auth() {
        assert_eq!(categorize_message("404 model xyz"), ErrorCategory::ModelNotFound);
        assert_eq!(
            categorize_message("The model `foo` does not exist"),
            ErrorCategory::ModelNotFound
        );
        assert_eq!(categorize_message("401"), ErrorCategory::AuthenticationFailure);
        assert_eq!(
            categorize_message("HTTP 403 Forbidden"),
            ErrorCategory::AuthenticationFailure
        );
        assert_eq!(
            categorize_message("Unauthorized: bad key"),
            ErrorCategory::AuthenticationFailure
        );
    }

    #[test]
    fn test_transient_and_unknown() {
        assert_eq!(
            categorize_message("operation timed out"),
            ErrorCategory::Transient
        );
        assert_eq!(
            categorize_message("connection reset by peer"),
            ErrorCategory::Transient
        );
        assert_eq!(categorize_message("something odd"), ErrorCategory::Unknown);
        assert_eq!(categorize_message(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_categorize_llm_error() {
        assert_eq!(
            categorize(&LlmError::api(404, "no model")),
            ErrorCategory::ModelNotFound
        );
        assert_eq!(
            categorize(&LlmError::Timeout("read".into())),
            ErrorCategory::Transient
        );
        assert_eq!(
            categorize(&LlmError::UnknownProvider("x:y".into())),
            ErrorCategory::ModelNotFound
        );
        assert_eq!(
            categorize(&LlmError::api(401, "bad key")),
            ErrorCategory::AuthenticationFailure
        );
    }

    #[test]
    fn test_base_cooldowns() {
        assert_eq!(ErrorCategory::QuotaExhausted.base_cooldown_secs(), 120);
        assert_eq!(ErrorCategory::ModelNotFound.base_cooldown_secs(), 3600);
        assert_eq!(ErrorCategory::RateLimited.base_cooldown_secs(), 30);
        assert_eq!(ErrorCategory::AuthenticationFailure.base_cooldown_secs(), 7200);
        assert_eq!(ErrorCategory::Transient.base_cooldown_secs(), 10);
        assert_eq!(ErrorCategory::Unknown.base_cooldown_secs(), 60);
    }
}
