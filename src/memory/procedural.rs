//! 程序记忆：按用户持久化的背景与偏好
//!
//! ProceduralStore 是外部键值存储的边界，有独立的错误面；MemoryComposer 对其失败做降级处理。

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MemoryError;

/// 单个用户的程序记忆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub background: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(background: impl Into<String>) -> Self {
        Self {
            background: background.into(),
            preferences: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }

    /// 渲染为一段文本（进入 system context）
    pub fn render(&self, user_id: &str) -> String {
        let mut out = format!("User {user_id}:");
        if !self.background.trim().is_empty() {
            out.push_str(&format!("\n  Background: {}", self.background.trim()));
        }
        for (k, v) in &self.preferences {
            out.push_str(&format!("\n  Preference {k}: {v}"));
        }
        out.push_str(&format!(
            "\n  Last updated: {}",
            self.last_updated.format("%Y-%m-%d %H:%M UTC")
        ));
        out
    }
}

/// 程序记忆存储
#[async_trait]
pub trait ProceduralStore: Send + Sync {
    /// 批量取回；未知用户不出现在结果中
    async fn fetch(&self, user_ids: &[String]) -> Result<HashMap<String, UserProfile>, MemoryError>;

    /// 写入或更新一条偏好 / 背景事实
    async fn remember(&self, user_id: &str, key: &str, value: &str) -> Result<(), MemoryError>;
}

/// 进程内实现（测试与单机运行）
#[derive(Default)]
pub struct InMemoryProceduralStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryProceduralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, profile: UserProfile) {
        self.profiles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.into(), profile);
    }

    pub fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }
}

#[async_trait]
impl ProceduralStore for InMemoryProceduralStore {
    async fn fetch(&self, user_ids: &[String]) -> Result<HashMap<String, UserProfile>, MemoryError> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn remember(&self, user_id: &str, key: &str, value: &str) -> Result<(), MemoryError> {
        if key.trim().is_empty() {
            return Err(MemoryError::Procedural("empty preference key".to_string()));
        }
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(""));
        if key == "background" {
            profile.background = value.to_string();
        } else {
            profile.preferences.insert(key.to_string(), value.to_string());
        }
        profile.last_updated = Utc::now();
        Ok(())
    }
}
