//! 按模型标识的熔断器
//!
//! 每个 ModelIdentifier 三态：可用（无记录）→ 冷却中（记录未过期）→ 可用（过期后下一次查询时惰性删除），
//! 或在冷却期内再次失败 → 更长的冷却（连续失败计数 +1，时长倍数封顶 4×）。
//! 整张失败表由一把互斥锁保护，「查询后删除」与「插入/覆盖」都在同一临界区内完成。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use super::classifier::{categorize, ErrorCategory};

/// 冷却倍数上限
const MAX_BACKOFF_MULTIPLIER: u32 = 4;
/// 记录中保留的错误信息最大字符数
const ERROR_MESSAGE_MAX_CHARS: usize = 200;

/// 时间源；测试中用 ManualClock 模拟时间流逝
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟（测试与回放用）
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 单个模型的失败记录；记录存在即表示该模型处于冷却中
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub model: String,
    pub category: ErrorCategory,
    pub failed_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
    /// 截断后的错误信息
    pub message: String,
    pub consecutive_failures: u32,
}

impl FailureRecord {
    pub fn cooldown(&self) -> std::time::Duration {
        (self.cooldown_until - self.failed_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// 熔断器：进程根部构造一次，以 Arc 注入编排器
pub struct CircuitBreaker {
    records: Mutex<HashMap<String, FailureRecord>>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, FailureRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 无记录或冷却已过期时返回 true；过期记录在此处删除
    pub fn is_available(&self, model: &str) -> bool {
        let now = self.clock.now();
        let mut table = self.table();
        match table.get(model) {
            None => true,
            Some(record) if record.cooldown_until <= now => {
                tracing::info!(model = %model, category = %record.category, "Model cooldown expired");
                table.remove(model);
                true
            }
            Some(_) => false,
        }
    }

    /// 记录一次失败；category 为 None 时先对 error 分类
    pub fn record_failure(
        &self,
        model: &str,
        error: &(dyn std::error::Error + 'static),
        category: Option<ErrorCategory>,
    ) -> FailureRecord {
        let category = category.unwrap_or_else(|| categorize(error));
        self.record_failure_message(model, &error.to_string(), category)
    }

    /// 以纯文本错误记录失败（错误已分类的场景）
    pub fn record_failure_message(
        &self,
        model: &str,
        message: &str,
        category: ErrorCategory,
    ) -> FailureRecord {
        let now = self.clock.now();
        let mut table = self.table();

        // 仅当上一条记录仍在冷却期内才累加；过期记录即使尚未被 is_available 删除，也从 1 重新计数
        let consecutive = match table.get(model) {
            Some(prev) if prev.cooldown_until > now => prev.consecutive_failures.saturating_add(1),
            _ => 1,
        };
        let multiplier = consecutive.min(MAX_BACKOFF_MULTIPLIER);
        let cooldown_secs = category.base_cooldown_secs() * u64::from(multiplier);
        let cooldown_until = now + ChronoDuration::seconds(cooldown_secs as i64);

        let record = FailureRecord {
            model: model.to_string(),
            category,
            failed_at: now,
            cooldown_until,
            message: truncate(message, ERROR_MESSAGE_MAX_CHARS),
            consecutive_failures: consecutive,
        };
        table.insert(model.to_string(), record.clone());
        drop(table);

        tracing::warn!(
            model = %model,
            category = %category,
            consecutive,
            cooldown_secs,
            "Model failure recorded"
        );
        record
    }

    /// 按原顺序过滤出当前可用的模型
    pub fn get_available<S: AsRef<str>>(&self, models: &[S]) -> Vec<String> {
        models
            .iter()
            .map(AsRef::as_ref)
            .filter(|m| self.is_available(m))
            .map(String::from)
            .collect()
    }

    /// 清除单个模型或全部记录
    pub fn reset(&self, model: Option<&str>) {
        let mut table = self.table();
        match model {
            Some(m) => {
                table.remove(m);
            }
            None => table.clear(),
        }
    }

    /// 当前全部记录（含已过期但尚未被惰性删除的），按模型名排序
    pub fn snapshot(&self) -> Vec<FailureRecord> {
        let mut records: Vec<FailureRecord> = self.table().values().cloned().collect();
        records.sort_by(|a, b| a.model.cmp(&b.model));
        records
    }

    pub fn record(&self, model: &str) -> Option<FailureRecord> {
        self.table().get(model).cloned()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::time::Duration;

    fn breaker() -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::default();
        (CircuitBreaker::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_rate_limited_cooldown_then_expiry() {
        let (cb, clock) = breaker();
        let err = LlmError::api(429, "slow down");
        cb.record_failure("openai:gpt-4o", &err, Some(ErrorCategory::RateLimited));
        assert!(!cb.is_available("openai:gpt-4o"));

        clock.advance(Duration::from_secs(29));
        assert!(!cb.is_available("openai:gpt-4o"));

        clock.advance(Duration::from_secs(1));
        assert!(cb.is_available("openai:gpt-4o"));
        assert!(cb.record("openai:gpt-4o").is_none());
    }

    #[test]
    fn test_backoff_multiplier_caps_at_four() {
        let (cb, clock) = breaker();
        let mut cooldowns = Vec::new();
        for _ in 0..5 {
            let rec = cb.record_failure_message("m", "timed out", ErrorCategory::Transient);
            cooldowns.push(rec.cooldown().as_secs());
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cooldowns, vec![10, 20, 30, 40, 40]);
        assert_eq!(cb.record("m").map(|r| r.consecutive_failures), Some(5));
    }

    #[test]
    fn test_failure_after_expiry_restarts_count() {
        let (cb, clock) = breaker();
        cb.record_failure_message("m", "timed out", ErrorCategory::Transient);
        cb.record_failure_message("m", "timed out", ErrorCategory::Transient);
        clock.advance(Duration::from_secs(21));
        assert!(cb.is_available("m"));
        let rec = cb.record_failure_message("m", "timed out", ErrorCategory::Transient);
        assert_eq!(rec.consecutive_failures, 1);
        assert_eq!(rec.cooldown().as_secs(), 10);
    }

    #[test]
    fn test_record_failure_classifies_when_no_category() {
        let (cb, _clock) = breaker();
        let rec = cb.record_failure("m", &LlmError::api(404, "missing"), None);
        assert_eq!(rec.category, ErrorCategory::ModelNotFound);
        assert_eq!(rec.cooldown().as_secs(), 3600);
    }

    #[test]
    fn test_get_available_preserves_order() {
        let (cb, _clock) = breaker();
        cb.record_failure_message("b", "401", ErrorCategory::AuthenticationFailure);
        let available = cb.get_available(&["a", "b", "c"]);
        assert_eq!(available, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_reset_single_and_all() {
        let (cb, _clock) = breaker();
        cb.record_failure_message("a", "x", ErrorCategory::Unknown);
        cb.record_failure_message("b", "x", ErrorCategory::Unknown);
        cb.reset(Some("a"));
        assert!(cb.is_available("a"));
        assert!(!cb.is_available("b"));
        cb.reset(None);
        assert!(cb.snapshot().is_empty());
    }

    #[test]
    fn test_message_truncated() {
        let (cb, _clock) = breaker();
        let long = "x".repeat(500);
        let rec = cb.record_failure_message("m", &long, ErrorCategory::Unknown);
        assert_eq!(rec.message.chars().count(), ERROR_MESSAGE_MAX_CHARS + 3);
    }

    #[test]
    fn test_concurrent_failures_do_not_lose_updates() {
        let cb = Arc::new(CircuitBreaker::with_clock(Arc::new(ManualClock::default())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                std::thread::spawn(move || {
                    cb.record_failure_message("shared", "timed out", ErrorCategory::Transient);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.record("shared").map(|r| r.consecutive_failures), Some(8));
    }
}
