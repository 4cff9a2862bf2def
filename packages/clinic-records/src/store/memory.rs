use super::{DocumentStore, Filter, CREATED_AT_FIELD, ID_FIELD};
use crate::error::StoreError;
use crate::log::STORE;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

///
/// In-process document store.
/// Used when no database is configured and in tests.
///
/// Each collection keeps documents in insertion order so that documents with
/// equal `createdAt` are returned most recently inserted first.
///
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

fn has_id(document: &Value, id: Uuid) -> bool {
    document.get(ID_FIELD).and_then(Value::as_str) == Some(id.to_string().as_str())
}

fn created_at(document: &Value) -> Option<DateTime<Utc>> {
    document
        .get(CREATED_AT_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        let document = collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| has_id(d, id)))
            .cloned();
        Ok(document)
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;

        let mut documents: Vec<Value> = collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .rev()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps reverse insertion order for equal timestamps
        documents.sort_by_key(|d| std::cmp::Reverse(created_at(d)));

        Ok(documents)
    }

    async fn save(&self, collection: &str, id: Uuid, document: Value) -> Result<(), StoreError> {
        if !document.is_object() {
            return Err(StoreError::MissingId {
                collection: collection.to_string(),
            });
        }

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        match documents.iter_mut().find(|d| has_id(d, id)) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }

        debug!(target: STORE, msg = "Saved document", collection, %id);
        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(false);
        };

        let before = documents.len();
        documents.retain(|d| !has_id(d, id));

        Ok(documents.len() < before)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|d| !filter.matches(d));

        Ok((before - documents.len()) as u64)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Map<String, Value>,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut updated = 0;
        for document in documents.iter_mut().filter(|d| filter.matches(d)) {
            if let Some(object) = document.as_object_mut() {
                for (field, value) in set {
                    object.insert(field.clone(), value.clone());
                }
                updated += 1;
            }
        }

        Ok(updated)
    }
}
