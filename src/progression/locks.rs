//! Per-key single-writer serialization for read-modify-write sequences.
//!
//! Lock order is fixed: a `quest:` key is always taken before a `user:` key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::SideQuestError;

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_key(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    pub fn quest_key(quest_id: &str) -> String {
        format!("quest:{}", quest_id)
    }

    fn slot(&self, key: &str) -> Result<Arc<Mutex<()>>, SideQuestError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| SideQuestError::Internal("lock table poisoned".to_string()))?;
        // drop slots nobody holds so the table does not grow forever
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        Ok(slots.entry(key.to_string()).or_default().clone())
    }

    /// Run `f` while holding `key`. Other callers on the same key wait.
    pub fn with<T>(
        &self,
        key: &str,
        f: impl FnOnce() -> Result<T, SideQuestError>,
    ) -> Result<T, SideQuestError> {
        let slot = self.slot(key)?;
        let _guard = slot
            .lock()
            .map_err(|_| SideQuestError::Internal(format!("lock for {} poisoned", key)))?;
        f()
    }
}
