use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::record::Record;

/// The persistent store records are read from on a cache miss.
///
/// Sessions are not shared between concurrent callers: every fetch acquires its own through
/// [`RecordStore::session`] and releases it by dropping it, whatever the outcome of the fetch.
pub trait RecordStore<R: Record>: Send + Sync + 'static {
    type Session: StoreSession<R>;

    fn session(&self) -> Result<Self::Session, StoreError>;
}

#[async_trait]
pub trait StoreSession<R: Record>: Send + Sync + 'static {
    /// Point query on the record's `id` field. Zero matches is [`StoreError::NotFound`].
    async fn get_by_key(&self, id: &str) -> Result<R, StoreError>;
}

#[derive(Debug)]
struct Collection<R> {
    records: RwLock<HashMap<String, R>>,
    open_sessions: AtomicUsize,
    sessions_opened: AtomicUsize,
    faulty: AtomicBool,
}

/// An in-process [`RecordStore`] that keeps track of its open sessions.
#[derive(Debug)]
pub struct MemoryStore<R> {
    inner: Arc<Collection<R>>,
}

impl<R: Record + Clone> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Collection {
                records: RwLock::new(HashMap::new()),
                open_sessions: AtomicUsize::new(0),
                sessions_opened: AtomicUsize::new(0),
                faulty: AtomicBool::new(false),
            }),
        }
    }

    pub async fn insert(&self, record: R) {
        self.inner.records.write().await.insert(record.id().to_owned(), record);
    }

    pub async fn insert_many<I: IntoIterator<Item = R>>(&self, records: I) {
        let mut guard = self.inner.records.write().await;
        for record in records.into_iter() {
            guard.insert(record.id().to_owned(), record);
        }
    }

    /// Makes every query fail with [`StoreError::Fault`].
    pub fn set_faulty(&self, faulty: bool) {
        self.inner.faulty.store(faulty, Ordering::SeqCst);
    }

    /// Sessions acquired and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions acquired over the lifetime of the store.
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }
}

impl<R: Record + Clone> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record + Clone> RecordStore<R> for MemoryStore<R> {
    type Session = MemorySession<R>;

    fn session(&self) -> Result<Self::Session, StoreError> {
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession { collection: self.inner.clone() })
    }
}

#[derive(Debug)]
pub struct MemorySession<R> {
    collection: Arc<Collection<R>>,
}

#[async_trait]
impl<R: Record + Clone> StoreSession<R> for MemorySession<R> {
    async fn get_by_key(&self, id: &str) -> Result<R, StoreError> {
        if self.collection.faulty.load(Ordering::SeqCst) {
            return Err(StoreError::Fault("no reachable servers".to_owned()));
        }
        self.collection
            .records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }
}

impl<R> Drop for MemorySession<R> {
    fn drop(&mut self) {
        self.collection.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
