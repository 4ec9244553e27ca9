use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::debug;

use crate::db::repositories::plan_repository::PlanRepository;
use crate::error::AppResult;
use crate::models::study_plan::StudyPlan;

pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 128;

/// Read-through LRU layer in front of another [`PlanRepository`].
///
/// Successful saves refresh the cached entry with the new version. Any failed
/// save evicts the user's entry so the next read goes back to storage.
pub struct CachedPlanRepository<R> {
    inner: R,
    cache: Mutex<LruCache<String, StudyPlan>>,
}

impl<R: PlanRepository> CachedPlanRepository<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn invalidate(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(user_id);
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl<R: PlanRepository> PlanRepository for CachedPlanRepository<R> {
    fn get(&self, user_id: &str) -> AppResult<Option<StudyPlan>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(plan) = cache.get(user_id) {
                debug!(target: "app::cache", %user_id, "plan cache hit");
                return Ok(Some(plan.clone()));
            }
        }

        let loaded = self.inner.get(user_id)?;
        if let (Some(plan), Ok(mut cache)) = (loaded.as_ref(), self.cache.lock()) {
            cache.put(user_id.to_string(), plan.clone());
        }
        Ok(loaded)
    }

    fn save(&self, plan: &StudyPlan) -> AppResult<i64> {
        match self.inner.save(plan) {
            Ok(version) => {
                if let Ok(mut cache) = self.cache.lock() {
                    let mut cached = plan.clone();
                    cached.version = version;
                    cache.put(plan.user_id.clone(), cached);
                }
                Ok(version)
            }
            Err(err) => {
                debug!(target: "app::cache", user_id = %plan.user_id, "evicting plan after failed save");
                self.invalidate(&plan.user_id);
                Err(err)
            }
        }
    }
}
