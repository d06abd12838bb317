//! In-process index for tests and dry runs.
//!
//! Implements both [`IndexWriter`] and [`NestedIndex`] over a map keyed by
//! document id. Versions start at 1 and increase on every overwrite, which
//! matches the version semantics of the current backend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use sync_types::{DocumentRef, Fields, SearchDocument};

use crate::error::BackendError;
use crate::writer::{strip_empty, IndexWriter, NestedIndex, SaveOptions, SaveResponse};

/// A document held by [`MemoryIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Stored body, including any join value
    pub body: Fields,
    /// Number of writes to this id
    pub version: u64,
    /// Routing key the document was written with
    pub routing: Option<String>,
}

/// Call counters, one per write operation.
#[derive(Debug, Default)]
struct Calls {
    add: AtomicUsize,
    save: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
    commit: AtomicUsize,
}

/// In-memory index with failure injection.
pub struct MemoryIndex {
    name: String,
    exists: AtomicBool,
    docs: Mutex<HashMap<String, StoredDocument>>,
    queued_failures: Mutex<VecDeque<BackendError>>,
    persistent_failure: Mutex<Option<BackendError>>,
    calls: Calls,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryIndex {
    /// Create an empty index that exists.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: AtomicBool::new(true),
            docs: Mutex::new(HashMap::new()),
            queued_failures: Mutex::new(VecDeque::new()),
            persistent_failure: Mutex::new(None),
            calls: Calls::default(),
        }
    }

    /// Mark the index as present or absent for [`NestedIndex::index_exists`].
    pub fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }

    /// Fail the next write with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: BackendError) {
        lock(&self.queued_failures).push_back(error);
    }

    /// Fail every write with `error` until cleared.
    pub fn fail_always(&self, error: BackendError) {
        *lock(&self.persistent_failure) = Some(error);
    }

    /// Stop failing writes.
    pub fn clear_failures(&self) {
        lock(&self.queued_failures).clear();
        *lock(&self.persistent_failure) = None;
    }

    /// Store a document directly, bypassing counters and failures.
    pub fn seed(&self, doc: &SearchDocument) {
        self.store(doc, doc.body());
    }

    /// Look up a stored document.
    pub fn get(&self, id: &str) -> Option<StoredDocument> {
        lock(&self.docs).get(id).cloned()
    }

    /// Whether a document is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.docs).contains_key(id)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        lock(&self.docs).len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted ids of all stored documents.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.docs).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn add_calls(&self) -> usize {
        self.calls.add.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.calls.save.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.calls.commit.load(Ordering::SeqCst)
    }

    /// Total writes attempted, including failed ones.
    pub fn total_calls(&self) -> usize {
        self.add_calls()
            + self.save_calls()
            + self.update_calls()
            + self.delete_calls()
            + self.commit_calls()
    }

    fn check_failure(&self) -> Result<(), BackendError> {
        if let Some(error) = lock(&self.queued_failures).pop_front() {
            return Err(error);
        }
        match lock(&self.persistent_failure).as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn store(&self, doc: &SearchDocument, body: Fields) -> u64 {
        let mut docs = lock(&self.docs);
        let version = docs.get(&doc.id).map(|d| d.version + 1).unwrap_or(1);
        docs.insert(
            doc.id.clone(),
            StoredDocument {
                body,
                version,
                routing: doc.routing.clone(),
            },
        );
        version
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl IndexWriter for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, docs: &[SearchDocument]) -> Result<(), BackendError> {
        self.calls.add.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        for doc in docs {
            self.store(doc, doc.body());
        }
        Ok(())
    }

    async fn update(
        &self,
        target: &DocumentRef,
        fields: &Fields,
        _refresh: bool,
    ) -> Result<(), BackendError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut docs = lock(&self.docs);
        let Some(stored) = docs.get_mut(&target.id) else {
            return Err(BackendError::Request {
                status: 404,
                body: format!("document {} not found", target.id),
            });
        };
        for (name, value) in fields {
            stored.body.insert(name.clone(), value.clone());
        }
        stored.version += 1;
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let mut docs = lock(&self.docs);
        for id in ids {
            docs.remove(id);
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), BackendError> {
        self.calls.commit.fetch_add(1, Ordering::SeqCst);
        self.check_failure()
    }
}

#[async_trait]
impl NestedIndex for MemoryIndex {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn index_exists(&self) -> Result<bool, BackendError> {
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn document_exists(&self, id: &str) -> Result<bool, BackendError> {
        Ok(self.contains(id))
    }

    async fn save(
        &self,
        doc: &SearchDocument,
        options: SaveOptions,
    ) -> Result<SaveResponse, BackendError> {
        self.calls.save.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let body = if options.skip_empty {
            strip_empty(&doc.body())
        } else {
            doc.body()
        };
        let version = self.store(doc, body);

        let meta = options.return_meta.then(|| {
            let mut meta = Fields::new();
            meta.insert("_index".into(), self.name.clone().into());
            meta.insert("_id".into(), doc.id.clone().into());
            meta.insert("_version".into(), version.into());
            let result = if version == 1 { "created" } else { "updated" };
            meta.insert("result".into(), result.into());
            meta
        });

        Ok(SaveResponse {
            id: doc.id.clone(),
            version,
            meta,
        })
    }
}
