use super::{DocumentStore, Filter};
use crate::config::DatabaseConfig;
use crate::connect;
use crate::error::{Error, StoreError};
use crate::log::STORE;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::{self, Debug};
use tokio_postgres::Client;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id UUID NOT NULL,
        body JSONB NOT NULL,
        PRIMARY KEY (collection, id)
    );
    CREATE INDEX IF NOT EXISTS documents_body_idx ON documents USING GIN (body);
"#;

const FIND_BY_ID: &str = "SELECT body FROM documents WHERE collection = $1 AND id = $2";

const FIND: &str = "SELECT body FROM documents WHERE collection = $1 AND body @> $2 \
     ORDER BY (body->>'createdAt')::timestamptz DESC NULLS LAST";

const SAVE: &str = "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
     ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body";

const DELETE_ONE: &str = "DELETE FROM documents WHERE collection = $1 AND id = $2";

const DELETE_MANY: &str = "DELETE FROM documents WHERE collection = $1 AND body @> $2";

const UPDATE_MANY: &str =
    "UPDATE documents SET body = body || $3 WHERE collection = $1 AND body @> $2";

///
/// Documents in a single PostgreSQL table as JSONB.
/// Filters use JSONB containment, which has the same semantics as `Filter::matches`.
///
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<PostgresStore, Error> {
        let client = connect::database(config).await?;

        client
            .batch_execute(CREATE_SCHEMA)
            .await
            .map_err(StoreError::from)?;

        info!(
            msg = "Connected to database",
            database = config.name,
            host = config.host,
            port = config.port
        );

        Ok(PostgresStore { client })
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
        let row = self.client.query_opt(FIND_BY_ID, &[&collection, &id]).await?;

        match row {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let rows = self
            .client
            .query(FIND, &[&collection, &filter.as_value()])
            .await?;

        debug!(target: STORE, msg = "Find", collection, rows = rows.len());

        rows.iter()
            .map(|row| row.try_get(0).map_err(StoreError::from))
            .collect()
    }

    async fn save(&self, collection: &str, id: Uuid, document: Value) -> Result<(), StoreError> {
        self.client
            .execute(SAVE, &[&collection, &id, &document])
            .await?;

        debug!(target: STORE, msg = "Saved document", collection, %id);
        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.client.execute(DELETE_ONE, &[&collection, &id]).await?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let deleted = self
            .client
            .execute(DELETE_MANY, &[&collection, &filter.as_value()])
            .await?;
        Ok(deleted)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Map<String, Value>,
    ) -> Result<u64, StoreError> {
        let set = Value::Object(set.clone());
        let updated = self
            .client
            .execute(UPDATE_MANY, &[&collection, &filter.as_value(), &set])
            .await?;
        Ok(updated)
    }
}

impl Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}
