use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_futures::Instrument;

use crate::{
    cache::CacheClient,
    coordinator::{fetch_misses, FetchContext},
    error::LookupError,
    metrics::Metrics,
    record::{decode, Record},
    span::{CallSpan, SpanContext},
    store::RecordStore,
    supervisor::TaskSupervisor,
};

/// Resolves batches of record ids cache-first, falling back to the store for misses.
///
/// A lookup:
///
/// 1. Deduplicates the requested ids.
/// 2. Issues a single multi-get to the cache for all of them.
/// 3. Decodes every hit. A payload that fails to decode is logged and the id stays pending, so it
///    is fetched from the store like any other miss.
/// 4. Fetches every pending id from the store concurrently, one task per id, and waits for all
///    of them. Each record fetched this way is written back to the cache in the background.
///
/// The result holds at most one record per distinct id, in no particular order. Ids that could
/// not be resolved, whether they do not exist or the store failed, are simply absent. The only
/// error is [`LookupError::CacheUnavailable`], returned before any store call is made.
pub struct BatchLookup<R, C, S> {
    fetch: FetchContext<C, S>,
    phantom_record: PhantomData<fn() -> R>,
}

impl<R, C, S> BatchLookup<R, C, S>
where
    R: Record,
    C: CacheClient + 'static,
    S: RecordStore<R>,
{
    pub fn new(cache: Arc<C>, store: Arc<S>, metrics: Arc<Metrics>) -> Self {
        Self::with_supervisor(cache, store, metrics, TaskSupervisor::new())
    }

    /// Like [`BatchLookup::new`], with cache write-backs handed to `write_backs`.
    pub fn with_supervisor(
        cache: Arc<C>,
        store: Arc<S>,
        metrics: Arc<Metrics>,
        write_backs: TaskSupervisor,
    ) -> Self {
        Self {
            fetch: FetchContext { cache, store, metrics, write_backs },
            phantom_record: PhantomData,
        }
    }

    /// Supervisor owning the outstanding cache write-backs.
    pub fn write_backs(&self) -> &TaskSupervisor {
        &self.fetch.write_backs
    }

    pub async fn lookup(&self, ctx: &SpanContext, ids: &[String]) -> Result<Vec<R>, LookupError> {
        let span = tracing::debug_span!(parent: ctx.tracing_span(), "lookup", requested = ids.len());
        let ctx = ctx.with_span(span.clone());
        self.lookup_batch(&ctx, ids).instrument(span).await
    }

    async fn lookup_batch(
        &self,
        ctx: &SpanContext,
        ids: &[String],
    ) -> Result<Vec<R>, LookupError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let distinct = ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect::<Vec<_>>();
        let mut pending = distinct.iter().map(String::as_str).collect::<HashSet<_>>();

        let cache_span = CallSpan::client(ctx, &self.fetch.metrics, "memcached", "get_profile");
        let hits = self.fetch.cache.get_multi(&distinct).await;
        cache_span.finish();

        let hits = match hits {
            Ok(hits) => hits,
            Err(e) if e.is_miss() => Default::default(),
            Err(e) => {
                tracing::error!(ids = ?distinct, error = %e, "cache multi-get failed");
                return Err(LookupError::CacheUnavailable(e));
            }
        };

        let mut found = Vec::with_capacity(distinct.len());
        for (id, payload) in hits.iter() {
            // Stray keys the cache returned but nobody asked for are ignored.
            if !pending.contains(id.as_str()) {
                continue;
            }
            match decode::<R>(payload) {
                Ok(record) => {
                    tracing::trace!(%id, "cache hit");
                    pending.remove(id.as_str());
                    found.push(record);
                }
                Err(e) => tracing::warn!(%id, error = %e, "undecodable cache entry, refetching"),
            }
        }

        // Keep request order for the fan-out so logs read in a predictable order.
        let misses =
            distinct.iter().filter(|id| pending.contains(id.as_str())).cloned().collect::<Vec<_>>();
        tracing::debug!(hits = found.len(), misses = misses.len());
        if misses.is_empty() {
            return Ok(found);
        }

        let found = Arc::new(Mutex::new(found));
        fetch_misses(ctx, &self.fetch, misses, found.clone()).await;

        let records = std::mem::take(&mut *found.lock().await);
        Ok(records)
    }
}
