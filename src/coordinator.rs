use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing_futures::Instrument;

use crate::{
    cache::CacheClient,
    metrics::Metrics,
    record::{encode, Record},
    span::{CallSpan, SpanContext},
    store::{RecordStore, StoreSession},
    supervisor::TaskSupervisor,
};

/// Shared collaborators of the store-fetch phase of a batch.
pub(crate) struct FetchContext<C, S> {
    pub cache: Arc<C>,
    pub store: Arc<S>,
    pub metrics: Arc<Metrics>,
    pub write_backs: TaskSupervisor,
}

impl<C, S> Clone for FetchContext<C, S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            write_backs: self.write_backs.clone(),
        }
    }
}

/// Fetches every pending id from the store, one task per id, and waits for all of them.
///
/// Fetched records are appended to `found` under its lock; the lock is never held across a
/// store call. Each fetched record is written back to the cache by a detached task that the
/// barrier does not wait on. A failed fetch is logged and leaves nothing behind.
pub(crate) async fn fetch_misses<R, C, S>(
    ctx: &SpanContext,
    fetch: &FetchContext<C, S>,
    pending: Vec<String>,
    found: Arc<Mutex<Vec<R>>>,
) where
    R: Record,
    C: CacheClient + 'static,
    S: RecordStore<R>,
{
    let tasks = pending
        .into_iter()
        .map(|id| {
            let span = tracing::debug_span!(parent: ctx.tracing_span(), "fetch_miss", id = %id);
            tokio::spawn(fetch_one(ctx.clone(), fetch.clone(), id, found.clone()).instrument(span))
        })
        .collect::<Vec<_>>();

    for joined in join_all(tasks).await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "store fetch task did not complete");
        }
    }
}

async fn fetch_one<R, C, S>(
    ctx: SpanContext,
    fetch: FetchContext<C, S>,
    id: String,
    found: Arc<Mutex<Vec<R>>>,
) where
    R: Record,
    C: CacheClient + 'static,
    S: RecordStore<R>,
{
    let fetched = {
        let client_span = CallSpan::client(&ctx, &fetch.metrics, "mongo", "profile");
        let fetched = match fetch.store.session() {
            Ok(session) => session.get_by_key(&id).await,
            Err(e) => Err(e),
        };
        client_span.finish();
        fetched
    };

    let record = match fetched {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(%id, error = %e, "failed to get record from store");
            return;
        }
    };

    let payload = encode(&record);
    found.lock().await.push(record);

    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(%id, error = %e, "failed to encode record, skipping write-back");
            return;
        }
    };

    let cache = fetch.cache.clone();
    let metrics = fetch.metrics.clone();
    // Not a `CallSpan::client`: the write-back outlives the request and must not count against
    // its exclusive latency.
    fetch.write_backs.spawn(async move {
        let _span = CallSpan::start(
            &ctx,
            &["memcached", "set_profile"],
            &metrics.client_requests,
            &metrics.client_latency,
        );
        if let Err(e) = cache.set(&id, payload).await {
            tracing::debug!(%id, error = %e, "cache write-back dropped");
        }
    });
}
