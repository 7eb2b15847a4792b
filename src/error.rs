use thiserror::Error;

/// Errors reported by a [`CacheClient`](crate::CacheClient).
///
/// `Miss` is the normal "nothing found" outcome of a multi-get and is never treated as a fault.
/// Every other variant means the cache could not be consulted at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
    #[error("cache unreachable: {0}")]
    Unreachable(String),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

/// Errors reported by a [`RecordStore`](crate::RecordStore) or one of its sessions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),
    #[error("store fault: {0}")]
    Fault(String),
    #[error("could not acquire store session: {0}")]
    Session(String),
}

/// Failure to move a record to or from its canonical byte form.
#[derive(Debug, Error)]
#[error("record codec: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// The only failure a batch lookup surfaces to its caller.
///
/// Per-identifier store and codec failures are absorbed by the lookup; they show up as absent
/// records, never as an error.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cache is unavailable")]
    CacheUnavailable(#[source] CacheError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server port must be set")]
    MissingPort,
    #[error("already registered as {0}")]
    AlreadyRegistered(String),
    #[error("registration of {service} failed: {reason}")]
    Register { service: String, reason: String },
}
