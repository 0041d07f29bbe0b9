//! TTL-bounded result cache
//!
//! Stores computed results keyed by [`AnalysisKey`]. Expiry is checked
//! lazily at read time; an entry observed past its TTL is removed and
//! reported as absent, so a stale result is never returned. TTLs are
//! per-put because they are analysis-type dependent (the orchestrator
//! resolves them from configuration).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::error::CacheError;
use super::types::{AnalysisKey, AnalysisResult};

struct CacheEntry {
    result: AnalysisResult,
    expires_at: Instant,
}

pub struct ResultCache {
    entries: RwLock<HashMap<AnalysisKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh result for `key`, or `None` if never stored or expired.
    pub fn get(&self, key: &AnalysisKey) -> Result<Option<AnalysisResult>, CacheError> {
        // Fast path under the read lock.
        let expired = {
            let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.result.clone()))
                }
                Some(_) => true,
            }
        };

        if expired {
            let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
            // Re-check under the write lock: a concurrent put may have
            // refreshed the entry since the read.
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > Instant::now() {
                    return Ok(Some(entry.result.clone()));
                }
                entries.remove(key);
            }
        }
        Ok(None)
    }

    /// Stores `result` with expiry `now + ttl`, overwriting any prior entry.
    pub fn put(
        &self,
        key: AnalysisKey,
        result: AnalysisResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(
            key,
            CacheEntry {
                result,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, key: &AnalysisKey) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    pub fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.clear();
        Ok(())
    }

    /// Number of stored entries, including any not yet observed as expired.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::AnalysisType;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    fn sample(analysis_type: AnalysisType) -> (AnalysisKey, AnalysisResult) {
        let key = AnalysisKey::compute(Path::new("/repo"), analysis_type, &BTreeMap::new());
        let result = AnalysisResult {
            analysis_type,
            project_path: PathBuf::from("/repo"),
            payload: json!({"ok": true}),
            computed_at: Utc::now(),
            duration_ms: 3,
        };
        (key, result)
    }

    #[test]
    fn test_get_absent() {
        let cache = ResultCache::new();
        let (key, _) = sample(AnalysisType::Project);
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_within_ttl() {
        let cache = ResultCache::new();
        let (key, result) = sample(AnalysisType::Project);
        cache
            .put(key.clone(), result.clone(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(result));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_absent_and_removed() {
        let cache = ResultCache::new();
        let (key, result) = sample(AnalysisType::Security);
        cache
            .put(key.clone(), result, Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get(&key).unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResultCache::new();
        let (key, first) = sample(AnalysisType::TechStack);
        let mut second = first.clone();
        second.payload = json!({"frameworks": ["react"]});
        cache
            .put(key.clone(), first, Duration::from_secs(60))
            .unwrap();
        cache
            .put(key.clone(), second.clone(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(&key).unwrap(), Some(second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = ResultCache::new();
        let (key, result) = sample(AnalysisType::Performance);
        cache
            .put(key.clone(), result, Duration::from_secs(60))
            .unwrap();
        cache.invalidate(&key).unwrap();
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ResultCache::new();
        for analysis_type in [AnalysisType::Project, AnalysisType::Security] {
            let (key, result) = sample(analysis_type);
            cache.put(key, result, Duration::from_secs(60)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        cache.invalidate_all().unwrap();
        assert!(cache.is_empty());
    }
}
