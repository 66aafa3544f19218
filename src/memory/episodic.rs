//! 情景记忆：跨会话的片段检索（可选）
//!
//! 支持 add(text) 与 search(query, k)；当前实现按分词重叠打分，后续可接向量库。

use std::collections::HashSet;
use std::sync::RwLock;

use super::tokenizer::{jaccard_similarity, overlap_score, tokenize_to_set};
use super::MemoryError;

pub trait EpisodicMemory: Send + Sync {
    fn add(&self, text: &str);

    /// 按相关度取最多 k 条片段；后端不可用时返回 MemoryError::Episodic
    fn search(&self, query: &str, k: usize) -> Result<Vec<String>, MemoryError>;
}

/// 内存实现：按词重叠数排序，重叠相同时按 Jaccard 排序；超出容量丢弃最旧条目
pub struct InMemoryEpisodic {
    store: RwLock<Vec<(String, HashSet<String>)>>,
    max_entries: usize,
}

impl InMemoryEpisodic {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEpisodic {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EpisodicMemory for InMemoryEpisodic {
    fn add(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let tokens = tokenize_to_set(text);
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.push((text.to_string(), tokens));
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(usize, f32, &str)> = store
            .iter()
            .map(|(text, doc)| {
                (
                    overlap_score(&query_tokens, doc),
                    jaccard_similarity(&query_tokens, doc),
                    text.as_str(),
                )
            })
            .filter(|(overlap, _, _)| *overlap > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.total_cmp(&a.1)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, _, t)| t.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_ranks_by_overlap() {
        let mem = InMemoryEpisodic::new(10);
        mem.add("alice adopted a cat named miso");
        mem.add("bob plays chess on weekends");
        mem.add("the cat miso likes tuna");
        let hits = mem.search("how is miso the cat?", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.contains("miso")));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mem = InMemoryEpisodic::new(2);
        mem.add("first entry");
        mem.add("second entry");
        mem.add("third entry");
        assert_eq!(mem.len(), 2);
        assert!(mem.search("first", 5).unwrap().is_empty());
    }

    #[test]
    fn test_empty_query() {
        let mem = InMemoryEpisodic::default();
        mem.add("something");
        assert!(mem.search("  ", 3).unwrap().is_empty());
    }
}
