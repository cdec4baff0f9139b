// 🗄️ Result cache - serve a finished result unchanged until its TTL expires
//
// Entries are never refreshed in place. Once expired, the next lookup
// misses and the pipeline recomputes the result from scratch.

use crate::assembler::IntegrationResult;
use crate::identifier::TaxIdentifier;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<TaxIdentifier, (Instant, Arc<IntegrationResult>)>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        ResultCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, id: &TaxIdentifier) -> Option<Arc<IntegrationResult>> {
        self.get_at(id, Instant::now())
    }

    pub fn insert(&self, id: TaxIdentifier, result: Arc<IntegrationResult>) {
        self.insert_at(id, result, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, (stored, _)| now.duration_since(*stored) < self.ttl);
        before - entries.len()
    }

    fn get_at(&self, id: &TaxIdentifier, now: Instant) -> Option<Arc<IntegrationResult>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(id) {
            Some((stored, result)) if now.saturating_duration_since(*stored) < self.ttl => {
                Some(Arc::clone(result))
            }
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, id: TaxIdentifier, result: Arc<IntegrationResult>, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(id, (now, result));
    }
}
