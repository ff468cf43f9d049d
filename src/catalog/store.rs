use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::protocol::Protocol;
use crate::core::types::ProtocolId;
use crate::utils::validation::{validate_protocols, ValidationError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Protocol '{0}' not found")]
    NotFound(ProtocolId),
}

/// Catalog version for compatibility checking
pub const CATALOG_VERSION: &str = "1.0.0";

/// Serializable catalog format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    pub version: String,
    pub created_at: String,
    pub protocols: Vec<Protocol>,
}

/// The catalog of hanging protocols, looked up by id
#[derive(Debug, Clone)]
pub struct ProtocolStore {
    protocols: Vec<Protocol>,

    /// Index: protocol ID -> index in protocols vec
    id_to_index: HashMap<ProtocolId, usize>,

    /// Fallback protocol; required by validation and never removed
    default_protocol_id: ProtocolId,
}

impl ProtocolStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocols: Vec::new(),
            id_to_index: HashMap::new(),
            default_protocol_id: ProtocolId::default_protocol(),
        }
    }

    /// Load the embedded default catalog
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the embedded catalog fails to parse or validate.
    pub fn load_embedded() -> Result<Self, CatalogError> {
        // Embedded at compile time via build.rs
        const EMBEDDED_CATALOG: &str = include_str!("../../catalogs/protocols.json");
        Self::from_json(EMBEDDED_CATALOG)
    }

    /// Load catalog from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ReadError` if the file cannot be read, or a
    /// parse/validation error for its contents.
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse catalog from JSON string.
    ///
    /// The catalog must contain the default protocol and no duplicate ids.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ParseError` for malformed JSON and
    /// `CatalogError::Invalid` for catalogs failing validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_json_with_default(json, &ProtocolId::default_protocol())
    }

    /// Parse catalog from JSON string whose fallback protocol is
    /// `default_protocol_id`
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ParseError` for malformed JSON and
    /// `CatalogError::Invalid` for catalogs failing validation, including one
    /// without `default_protocol_id`.
    pub fn from_json_with_default(json: &str, default_protocol_id: &ProtocolId) -> Result<Self, CatalogError> {
        let data: CatalogData = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if data.version != CATALOG_VERSION {
            warn!(
                expected = CATALOG_VERSION,
                found = %data.version,
                "Catalog version mismatch"
            );
        }

        for warning in validate_protocols(&data.protocols, default_protocol_id.as_str())? {
            warn!("{warning}");
        }

        let mut store = Self::new();
        store.default_protocol_id = default_protocol_id.clone();
        for protocol in data.protocols {
            store.add_protocol(protocol);
        }

        Ok(store)
    }

    /// Add a protocol, replacing any protocol with the same id
    pub fn add_protocol(&mut self, protocol: Protocol) {
        if let Some(&index) = self.id_to_index.get(&protocol.id) {
            self.protocols[index] = protocol;
            return;
        }

        self.id_to_index.insert(protocol.id.clone(), self.protocols.len());
        self.protocols.push(protocol);
    }

    /// Replace an existing protocol and stamp its modification date
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no protocol has the given id.
    pub fn update_protocol(&mut self, mut protocol: Protocol) -> Result<(), CatalogError> {
        let index = *self
            .id_to_index
            .get(&protocol.id)
            .ok_or_else(|| CatalogError::NotFound(protocol.id.clone()))?;

        protocol.touch();
        self.protocols[index] = protocol;
        Ok(())
    }

    /// Remove a protocol, returning it.
    ///
    /// The default protocol cannot be removed.
    pub fn remove_protocol(&mut self, id: &ProtocolId) -> Option<Protocol> {
        if *id == self.default_protocol_id {
            warn!(protocol_id = %id, "Refusing to remove the default protocol");
            return None;
        }

        let index = self.id_to_index.remove(id)?;
        let removed = self.protocols.remove(index);
        for slot in self.id_to_index.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Get a protocol by ID
    #[must_use]
    pub fn get(&self, id: &ProtocolId) -> Option<&Protocol> {
        self.id_to_index.get(id).map(|&idx| &self.protocols[idx])
    }

    /// All protocols in catalog order
    #[must_use]
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    /// The fallback protocol
    #[must_use]
    pub fn default_protocol(&self) -> Option<&Protocol> {
        self.get(&self.default_protocol_id)
    }

    /// Id of the fallback protocol
    #[must_use]
    pub fn default_protocol_id(&self) -> &ProtocolId {
        &self.default_protocol_id
    }

    /// Make another protocol of the store the fallback
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no protocol has the given id.
    pub fn set_default_protocol_id(&mut self, id: ProtocolId) -> Result<(), CatalogError> {
        if !self.id_to_index.contains_key(&id) {
            return Err(CatalogError::NotFound(id));
        }
        self.default_protocol_id = id;
        Ok(())
    }

    /// Export catalog to JSON
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ParseError` if serialization fails.
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let data = CatalogData {
            version: CATALOG_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            protocols: self.protocols.clone(),
        };
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Number of protocols in catalog
    #[must_use]
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Check if catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl Default for ProtocolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Protocol> for ProtocolStore {
    fn from_iter<I: IntoIterator<Item = Protocol>>(iter: I) -> Self {
        let mut store = Self::new();
        for protocol in iter {
            store.add_protocol(protocol);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DEFAULT_PROTOCOL_ID;

    #[test]
    fn test_load_embedded_catalog() {
        let store = ProtocolStore::load_embedded().unwrap();
        assert!(!store.is_empty());
        assert!(store.default_protocol().is_some());
    }

    #[test]
    fn test_store_get_by_id() {
        let store = ProtocolStore::load_embedded().unwrap();

        let default = store.get(&ProtocolId::default_protocol()).unwrap();
        assert_eq!(default.stages.len(), 1);
        assert!(default.protocol_matching_rules.is_empty());
        assert!(store.get(&ProtocolId::new("nonexistent")).is_none());
    }

    #[test]
    fn test_add_replaces_same_id() {
        let mut store = ProtocolStore::new();
        store.add_protocol(Protocol::new("a", "First"));
        store.add_protocol(Protocol::new("b", "Second"));
        store.add_protocol(Protocol::new("a", "Replaced"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&ProtocolId::new("a")).unwrap().display_name(), "Replaced");
        assert_eq!(store.protocols()[0].id.as_str(), "a");
    }

    #[test]
    fn test_update_and_remove() {
        let mut store: ProtocolStore = vec![
            Protocol::new(DEFAULT_PROTOCOL_ID, "Default"),
            Protocol::new("a", "A"),
            Protocol::new("b", "B"),
        ]
        .into_iter()
        .collect();

        store.update_protocol(Protocol::new("b", "B2")).unwrap();
        assert!(store.get(&ProtocolId::new("b")).unwrap().modified_date.is_some());
        assert!(matches!(
            store.update_protocol(Protocol::new("zzz", "Z")),
            Err(CatalogError::NotFound(_))
        ));

        let removed = store.remove_protocol(&ProtocolId::new("a")).unwrap();
        assert_eq!(removed.id.as_str(), "a");
        assert_eq!(store.get(&ProtocolId::new("b")).unwrap().display_name(), "B2");
        assert!(store.remove_protocol(&ProtocolId::default_protocol()).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let store = ProtocolStore::load_embedded().unwrap();
        let json = store.to_json().unwrap();
        let reloaded = ProtocolStore::from_json(&json).unwrap();
        assert_eq!(reloaded.len(), store.len());
        assert_eq!(reloaded.protocols(), store.protocols());
    }

    #[test]
    fn test_custom_default_protocol() {
        let json = r#"{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [{"id": "fallback"}, {"id": "other"}]}"#;
        let fallback = ProtocolId::new("fallback");

        assert!(matches!(ProtocolStore::from_json(json), Err(CatalogError::Invalid(_))));

        let mut store = ProtocolStore::from_json_with_default(json, &fallback).unwrap();
        assert_eq!(store.default_protocol_id(), &fallback);
        assert_eq!(store.default_protocol().unwrap().id, fallback);
        assert!(store.remove_protocol(&fallback).is_none());

        store.set_default_protocol_id(ProtocolId::new("other")).unwrap();
        assert!(store.remove_protocol(&fallback).is_some());
        assert!(store.remove_protocol(&ProtocolId::new("other")).is_none());
        assert!(matches!(
            store.set_default_protocol_id(ProtocolId::new("gone")),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_missing_default() {
        let json = r#"{"version": "1.0.0", "created_at": "2024-01-01T00:00:00Z", "protocols": [{"id": "only"}]}"#;
        assert!(matches!(ProtocolStore::from_json(json), Err(CatalogError::Invalid(_))));
    }
}
