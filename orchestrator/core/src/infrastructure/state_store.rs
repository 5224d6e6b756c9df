// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory State Store
//
// Process-local StateStore backed by a sharded concurrent map. Values live
// for the lifetime of the process; there is no TTL or persistence.

use crate::domain::state::{validate_key, StateStore, StateStoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<DashMap<String, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateStoreError> {
        validate_key(key)?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateStoreError> {
        validate_key(key)?;
        trace!(key, "State set");
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateStoreError> {
        validate_key(key)?;
        trace!(key, "State delete");
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StateStoreError> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}
