use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::fragment::AssembledContext;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub template_id: String,
    pub agent_class: String,
    pub work_order_id: String,
    pub session_id: String,
}

/// `(template_id, agent_class, work_order_id, session_id) -> (AssembledContext, inserted_at)`.
/// A plain TTL cache: reads never rebuild on their own, writes always
/// overwrite, and a hit short-circuits the whole pipeline.
pub struct ContextCache {
    entries: DashMap<CacheKey, (AssembledContext, Instant)>,
    ttl: Duration,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<AssembledContext> {
        let hit = self.entries.get(key)?;
        let (context, inserted_at) = hit.value();
        if inserted_at.elapsed() >= self.ttl {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(context.clone())
    }

    pub fn insert(&self, key: CacheKey, context: AssembledContext) {
        self.entries.insert(key, (context, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::AssembledContext;

    fn ctx() -> AssembledContext {
        AssembledContext {
            context_text: "hello".to_string(),
            context_hash: helm_hash::hash_string("hello"),
            fragments: vec![],
            pipeline_trace: vec![],
        }
    }

    fn key() -> CacheKey {
        CacheKey {
            template_id: "t".into(),
            agent_class: "classifier".into(),
            work_order_id: "WO-1".into(),
            session_id: "S-1".into(),
        }
    }

    #[test]
    fn hit_returns_cached_value() {
        let cache = ContextCache::new(Duration::from_secs(60));
        cache.insert(key(), ctx());
        assert!(cache.get(&key()).is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = ContextCache::new(Duration::from_millis(1));
        cache.insert(key(), ctx());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key()).is_none());
    }
}
