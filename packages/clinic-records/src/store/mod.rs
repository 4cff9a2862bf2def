//!
//! Document persistence.
//!
//! Documents are JSON objects stored in named collections and keyed by `_id`.
//! Every operation is atomic for a single document only. The core never relies
//! on cross-document transactions.
//!
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";

#[async_trait]
pub trait DocumentStore: Debug + Send + Sync {
    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError>;

    /// Matching documents, newest `createdAt` first
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Insert or replace by id
    async fn save(&self, collection: &str, id: Uuid, document: Value) -> Result<(), StoreError>;

    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Shallow merge of `set` into every matching document
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Map<String, Value>,
    ) -> Result<u64, StoreError>;
}

///
/// Equality match on top level fields.
/// An empty filter matches every document.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn all() -> Filter {
        Filter::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Filter {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

///
/// A stored entity type
///
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

///
/// Typed view of a collection.
///
#[derive(Debug)]
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            store: self.store.clone(),
            _document: PhantomData,
        }
    }
}

impl<T: Document> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Collection<T> {
        Collection {
            store,
            _document: PhantomData,
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        match self.store.find_by_id(T::COLLECTION, id).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        self.store
            .find(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(StoreError::from))
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> Result<Option<T>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    pub async fn save(&self, document: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.store.save(T::COLLECTION, document.id(), value).await
    }

    pub async fn delete_one(&self, id: Uuid) -> Result<bool, StoreError> {
        self.store.delete_one(T::COLLECTION, id).await
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.store.delete_many(T::COLLECTION, filter).await
    }

    pub async fn update_many(
        &self,
        filter: &Filter,
        set: &Map<String, Value>,
    ) -> Result<u64, StoreError> {
        self.store.update_many(T::COLLECTION, filter, set).await
    }
}
