// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared State Store
//!
//! Key-value store any component (or an external runtime through the
//! language bridge) uses to exchange data outside the graph's edges.
//! Concurrent `set` calls on the same key are last-write-wins. There is no
//! TTL or persistence here; a backing cache or database is an external
//! concern reached through another implementation of [`StateStore`].

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// `Ok(None)` for a key that was never set
    async fn get(&self, key: &str) -> Result<Option<Value>, StateStoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StateStoreError>;

    /// Deleting an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), StateStoreError>;

    async fn keys(&self) -> Result<Vec<String>, StateStoreError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateStoreError {
    #[error("Invalid state key: {0:?}")]
    InvalidKey(String),

    #[error("State backend unavailable: {0}")]
    Unavailable(String),
}

/// Reject keys a backend could not address
pub fn validate_key(key: &str) -> Result<(), StateStoreError> {
    if key.trim().is_empty() {
        return Err(StateStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
