//! Content-addressed storage boundary for off-ledger metadata.
//!
//! The ledger only ever records the content address; profiles and session
//! details live wherever a [`BlobStore`] puts them.

use serde_json::Value;
use std::collections::HashMap;

/// A store that addresses JSON documents by their content.
pub trait BlobStore {
    type Error: std::error::Error;

    /// Store a document and return its content address.
    fn put(&mut self, document: &Value) -> Result<String, Self::Error>;

    /// Fetch a document by content address.
    fn get(&self, address: &str) -> Result<Option<Value>, Self::Error>;
}

/// Content address of a document: Blake3 over its compact JSON encoding.
pub fn content_address(document: &Value) -> String {
    let bytes = document.to_string();
    hex::encode(blake3::hash(bytes.as_bytes()).as_bytes())
}

/// In-process blob store, mostly for tests and tooling.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Value>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    type Error = std::convert::Infallible;

    fn put(&mut self, document: &Value) -> Result<String, Self::Error> {
        let address = content_address(document);
        self.blobs.entry(address.clone()).or_insert_with(|| document.clone());
        Ok(address)
    }

    fn get(&self, address: &str) -> Result<Option<Value>, Self::Error> {
        Ok(self.blobs.get(address).cloned())
    }
}
