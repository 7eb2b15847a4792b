//! Cache-aside batch lookup of records.
//!
//! A [`BatchLookup`] resolves a batch of ids against a [`CacheClient`] first and fetches the
//! misses from a [`RecordStore`] concurrently, writing fetched records back to the cache in the
//! background. Every cache, store and inbound call is timed by a [`CallSpan`] that feeds both
//! `tracing` and the process-wide [`Metrics`].

mod cache;
pub mod config;
mod coordinator;
mod error;
mod logging;
mod lookup;
mod metrics;
mod record;
mod server;
mod span;
mod store;
mod supervisor;

pub use cache::{CacheClient, MemoryCache};
pub use config::{load_config, ServiceConfig};
pub use error::{CacheError, CodecError, LookupError, RegistryError, StoreError};
pub use logging::init_logging;
pub use lookup::BatchLookup;
pub use metrics::{Counter, CounterVec, Histogram, HistogramVec, Metrics, DEFAULT_BUCKETS};
pub use record::{decode, encode, Address, Hotel, Image, Record};
pub use server::{GetProfilesRequest, GetProfilesResponse, ProfileServer, Registry};
pub use span::{CallSpan, SpanContext};
pub use store::{MemorySession, MemoryStore, RecordStore, StoreSession};
pub use supervisor::TaskSupervisor;
