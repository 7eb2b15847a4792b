#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use profile_lookup::{
    encode, CacheClient, CacheError, Hotel, MemoryCache, MemorySession, MemoryStore, RecordStore,
    StoreError, StoreSession,
};
use tokio::sync::{Barrier, Semaphore};

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| (*id).to_owned()).collect()
}

pub fn sorted_ids(hotels: &[Hotel]) -> Vec<String> {
    let mut ids = hotels.iter().map(|h| h.id.clone()).collect::<Vec<_>>();
    ids.sort();
    ids
}

pub fn hotel(id: &str) -> Hotel {
    Hotel::new(id, format!("Hotel {}", id))
}

/// Cache that counts calls and can hold write-backs until released.
#[derive(Default)]
pub struct CountingCache {
    pub inner: MemoryCache,
    pub get_multi_calls: AtomicUsize,
    sets: Mutex<HashMap<String, usize>>,
    gate: Option<Semaphore>,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `set` blocks until [`CountingCache::release_sets`] hands out a permit.
    pub fn gated() -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Default::default() }
    }

    pub fn release_sets(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub async fn seed(&self, hotel: &Hotel) {
        self.inner.set(&hotel.id, encode(hotel).unwrap()).await.unwrap();
    }

    pub async fn seed_raw(&self, id: &str, payload: &[u8]) {
        self.inner.set(id, payload.to_vec()).await.unwrap();
    }

    pub fn get_multi_calls(&self) -> usize {
        self.get_multi_calls.load(Ordering::SeqCst)
    }

    pub fn sets_for(&self, id: &str) -> usize {
        self.sets.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_sets(&self) -> usize {
        self.sets.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl CacheClient for CountingCache {
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        self.get_multi_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_multi(keys).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        *self.sets.lock().unwrap().entry(key.to_owned()).or_default() += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.inner.set(key, value).await
    }
}

/// Store that counts queries per id and can fail or rendezvous on demand.
#[derive(Clone)]
pub struct CountingStore {
    pub inner: Arc<MemoryStore<Hotel>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    failing: Arc<HashSet<String>>,
    panicking: Arc<HashSet<String>>,
    refuse_sessions: bool,
    rendezvous: Option<Arc<Barrier>>,
}

impl CountingStore {
    pub async fn with(hotels: &[Hotel]) -> Self {
        let inner = MemoryStore::new();
        inner.insert_many(hotels.iter().cloned()).await;
        Self {
            inner: Arc::new(inner),
            calls: Default::default(),
            failing: Default::default(),
            panicking: Default::default(),
            refuse_sessions: false,
            rendezvous: None,
        }
    }

    /// Queries for these ids fail with a store fault.
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = Arc::new(ids.iter().map(|id| (*id).to_owned()).collect());
        self
    }

    /// Queries for these ids panic.
    pub fn panicking(mut self, ids: &[&str]) -> Self {
        self.panicking = Arc::new(ids.iter().map(|id| (*id).to_owned()).collect());
        self
    }

    /// No session can be acquired.
    pub fn refusing_sessions(mut self) -> Self {
        self.refuse_sessions = true;
        self
    }

    /// Every query waits until `n` queries are in flight at once.
    pub fn rendezvous(mut self, n: usize) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(n)));
        self
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

pub struct CountingSession {
    inner: MemorySession<Hotel>,
    store: CountingStore,
}

impl RecordStore<Hotel> for CountingStore {
    type Session = CountingSession;

    fn session(&self) -> Result<Self::Session, StoreError> {
        if self.refuse_sessions {
            return Err(StoreError::Session("connection pool exhausted".to_owned()));
        }
        Ok(CountingSession { inner: self.inner.session()?, store: self.clone() })
    }
}

#[async_trait]
impl StoreSession<Hotel> for CountingSession {
    async fn get_by_key(&self, id: &str) -> Result<Hotel, StoreError> {
        *self.store.calls.lock().unwrap().entry(id.to_owned()).or_default() += 1;
        if let Some(barrier) = &self.store.rendezvous {
            barrier.wait().await;
        }
        if self.store.panicking.contains(id) {
            panic!("driver crashed while reading {}", id);
        }
        if self.store.failing.contains(id) {
            return Err(StoreError::Fault(format!("lost connection while reading {}", id)));
        }
        self.inner.get_by_key(id).await
    }
}
