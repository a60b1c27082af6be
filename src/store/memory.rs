use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{merge_patch, prepare_create, Collection, Document, DocumentStore, Filter};
use crate::errors::SideQuestError;

type Collections = HashMap<Collection, BTreeMap<String, Document>>;

/// In-process store with the same semantics as the sled backend.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, SideQuestError> {
        self.inner
            .read()
            .map_err(|_| SideQuestError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, SideQuestError> {
        self.inner
            .write()
            .map_err(|_| SideQuestError::Internal("memory store lock poisoned".to_string()))
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        self.read()
            .map(|guard| guard.get(&collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, SideQuestError> {
        let (id, data) = prepare_create(id, data);
        self.write()?
            .entry(collection)
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, SideQuestError> {
        Ok(self
            .read()?
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<(), SideQuestError> {
        let mut guard = self.write()?;
        let doc = guard
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| SideQuestError::not_found(collection.entity(), id))?;
        merge_patch(doc, patch);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), SideQuestError> {
        if let Some(docs) = self.write()?.get_mut(&collection) {
            docs.remove(id);
        }
        Ok(())
    }

    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, SideQuestError> {
        Ok(self
            .read()?
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
