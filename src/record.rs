use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CodecError;

/// An entity that can be looked up by identifier, cached as bytes, and fetched from the store.
///
/// The identifier returned by [`Record::id`] must be the same string the record is keyed by in
/// both the cache and the store.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Serializes a record into the byte form stored in the cache.
pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(record)?)
}

/// Parses a cache payload back into a record.
pub fn decode<R: Record>(bytes: &[u8]) -> Result<R, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A hotel profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub description: String,
    pub address: Option<Address>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street_number: String,
    pub street_name: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub lat: f32,
    pub lon: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub url: String,
    pub default: bool,
}

impl Hotel {
    /// A profile carrying only its id and name, mostly useful for seeding stores.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), ..Default::default() }
    }
}

impl Record for Hotel {
    fn id(&self) -> &str {
        &self.id
    }
}
