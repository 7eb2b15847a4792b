use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    cache::CacheClient,
    config::ServerConfig,
    error::{LookupError, RegistryError},
    lookup::BatchLookup,
    metrics::Metrics,
    record::Hotel,
    span::{CallSpan, SpanContext},
    store::RecordStore,
    supervisor::TaskSupervisor,
};

/// Service discovery the server announces itself to.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(
        &self,
        service: &str,
        instance_id: &str,
        address: &str,
        port: u16,
    ) -> Result<(), RegistryError>;

    async fn deregister(&self, instance_id: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProfilesRequest {
    pub hotel_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetProfilesResponse {
    pub hotels: Vec<Hotel>,
}

/// The hotel profile service: request handling plus registration lifecycle.
///
/// Transport (listener, TLS, keepalive) lives outside; it only needs to route each inbound
/// `GetProfiles` call to [`ProfileServer::get_profiles`].
pub struct ProfileServer<C, S> {
    config: ServerConfig,
    lookup: BatchLookup<Hotel, C, S>,
    metrics: Arc<Metrics>,
    registry: Arc<dyn Registry>,
    instance_id: Mutex<Option<String>>,
}

impl<C, S> ProfileServer<C, S>
where
    C: CacheClient + 'static,
    S: RecordStore<Hotel>,
{
    pub fn new(
        config: ServerConfig,
        cache: Arc<C>,
        store: Arc<S>,
        metrics: Arc<Metrics>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        let lookup = BatchLookup::new(cache, store, metrics.clone());
        Self { config, lookup, metrics, registry, instance_id: Mutex::new(None) }
    }

    /// Returns the profiles of the requested hotels.
    ///
    /// Hotels that could not be found are left out of the response. The call fails only when the
    /// cache cannot be reached.
    pub async fn get_profiles(
        &self,
        ctx: &SpanContext,
        request: GetProfilesRequest,
    ) -> Result<GetProfilesResponse, LookupError> {
        let server_span = CallSpan::server(ctx, &self.metrics, "GetProfiles");
        let hotels = self.lookup.lookup(&server_span.context(), &request.hotel_ids).await?;
        tracing::trace!(returned = hotels.len(), "GetProfiles done");
        server_span.finish();
        Ok(GetProfilesResponse { hotels })
    }

    /// Registers this instance under a fresh id. Returns the id.
    ///
    /// An instance registers at most once; a second call fails without touching the registry.
    pub async fn register(&self) -> Result<String, RegistryError> {
        if self.config.port == 0 {
            return Err(RegistryError::MissingPort);
        }
        // Held across the registry call so concurrent callers cannot both register.
        let mut instance_id = self.instance_id.lock().await;
        if let Some(existing) = instance_id.as_ref() {
            return Err(RegistryError::AlreadyRegistered(existing.clone()));
        }
        let id = Uuid::new_v4().to_string();
        self.registry
            .register(&self.config.name, &id, &self.config.address, self.config.port)
            .await?;
        tracing::info!(service = %self.config.name, instance_id = %id, "registered");
        *instance_id = Some(id.clone());
        Ok(id)
    }

    /// Waits for outstanding cache write-backs, then deregisters.
    pub async fn shutdown(&self) {
        self.lookup.write_backs().drain().await;
        if let Some(id) = self.instance_id.lock().await.take() {
            self.registry.deregister(&id).await;
            tracing::info!(service = %self.config.name, instance_id = %id, "deregistered");
        }
    }

    /// Supervisor owning the outstanding cache write-backs.
    pub fn write_backs(&self) -> &TaskSupervisor {
        self.lookup.write_backs()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
