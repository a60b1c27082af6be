use std::path::{Path, PathBuf};

use log::debug;
use sled::IVec;

use super::{merge_patch, prepare_create, Collection, Document, DocumentStore, Filter};
use crate::errors::SideQuestError;

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledDocumentStoreBuilder {
    path: PathBuf,
    flush_writes: bool,
}

impl SledDocumentStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_writes: true,
        }
    }

    /// Skip the per-write flush (bulk imports, benchmarks).
    pub fn without_flush(mut self) -> Self {
        self.flush_writes = false;
        self
    }

    pub fn open(self) -> Result<SledDocumentStore, SideQuestError> {
        SledDocumentStore::open_with_options(self.path, self.flush_writes)
    }
}

/// Sled-backed persistence: one tree per collection, JSON documents keyed by id.
pub struct SledDocumentStore {
    _db: sled::Db,
    users: sled::Tree,
    quests: sled::Tree,
    sidequests: sled::Tree,
    flush_writes: bool,
}

impl SledDocumentStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SideQuestError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, flush_writes: bool) -> Result<Self, SideQuestError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let users = db.open_tree(Collection::Users.as_str())?;
        let quests = db.open_tree(Collection::Quests.as_str())?;
        let sidequests = db.open_tree(Collection::Sidequests.as_str())?;
        debug!("opened sled document store at {}", path_ref.display());
        Ok(Self {
            _db: db,
            users,
            quests,
            sidequests,
            flush_writes,
        })
    }

    fn tree(&self, collection: Collection) -> &sled::Tree {
        match collection {
            Collection::Users => &self.users,
            Collection::Quests => &self.quests,
            Collection::Sidequests => &self.sidequests,
        }
    }

    fn serialize(doc: &Document) -> Result<Vec<u8>, SideQuestError> {
        Ok(serde_json::to_vec(doc)?)
    }

    fn deserialize(bytes: IVec) -> Result<Document, SideQuestError> {
        Ok(serde_json::from_slice::<Document>(&bytes)?)
    }

    fn write(&self, tree: &sled::Tree, id: &str, doc: &Document) -> Result<(), SideQuestError> {
        tree.insert(id.as_bytes(), Self::serialize(doc)?)?;
        if self.flush_writes {
            tree.flush()?;
        }
        Ok(())
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        self.tree(collection).len()
    }
}

impl DocumentStore for SledDocumentStore {
    fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, SideQuestError> {
        let (id, data) = prepare_create(id, data);
        self.write(self.tree(collection), &id, &data)?;
        Ok(id)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, SideQuestError> {
        match self.tree(collection).get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<(), SideQuestError> {
        let tree = self.tree(collection);
        let Some(bytes) = tree.get(id.as_bytes())? else {
            return Err(SideQuestError::not_found(collection.entity(), id));
        };
        let mut doc = Self::deserialize(bytes)?;
        merge_patch(&mut doc, patch);
        self.write(tree, id, &doc)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), SideQuestError> {
        let tree = self.tree(collection);
        tree.remove(id.as_bytes())?;
        if self.flush_writes {
            tree.flush()?;
        }
        Ok(())
    }

    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, SideQuestError> {
        let mut out = Vec::new();
        for entry in self.tree(collection).iter() {
            let (_key, value) = entry?;
            let doc = Self::deserialize(value)?;
            if filter.matches(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }
}
