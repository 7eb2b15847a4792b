use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use profile_lookup::{
    init_logging, load_config, Address, GetProfilesRequest, Hotel, MemoryCache, MemoryStore,
    Metrics, ProfileServer, Registry, RegistryError, ServiceConfig, SpanContext,
};

// Stands in for the service registry; it only logs what it is told.
struct LogRegistry;

#[async_trait]
impl Registry for LogRegistry {
    async fn register(
        &self,
        service: &str,
        instance_id: &str,
        address: &str,
        port: u16,
    ) -> Result<(), RegistryError> {
        tracing::info!(service, instance_id, address, port, "register");
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) {
        tracing::info!(instance_id, "deregister");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => ServiceConfig::default(),
    };
    init_logging(&config.logging)?;

    let store = MemoryStore::new();
    let mut clift = Hotel::new("1", "Clift Hotel");
    clift.address = Some(Address {
        street_number: "495".into(),
        street_name: "Geary St".into(),
        city: "San Francisco".into(),
        state: "CA".into(),
        country: "United States".into(),
        postal_code: "94102".into(),
        lat: 37.7867,
        lon: -122.4112,
    });
    store
        .insert_many(vec![clift, Hotel::new("2", "W San Francisco"), Hotel::new("3", "Hotel Zetta")])
        .await;

    let metrics = Arc::new(Metrics::with_buckets(&config.metrics.latency_buckets));
    let server = ProfileServer::new(
        config.server.clone(),
        Arc::new(MemoryCache::new()),
        Arc::new(store),
        metrics.clone(),
        Arc::new(LogRegistry),
    );
    server.register().await?;

    let ctx = SpanContext::current();
    let request =
        GetProfilesRequest { hotel_ids: vec!["1".into(), "2".into(), "1".into(), "404".into()] };
    for round in ["cold", "warm"] {
        let response = server.get_profiles(&ctx, request.clone()).await?;
        println!("{} cache: {}", round, serde_json::to_string_pretty(&response)?);
        // Let the write-backs land before the next round.
        server.write_backs().drain().await;
    }

    server.shutdown().await;
    println!(
        "memcached get_profile calls: {}, mongo profile calls: {}",
        metrics.client_requests.get(&["memcached", "get_profile"]),
        metrics.client_requests.get(&["mongo", "profile"]),
    );
    Ok(())
}
