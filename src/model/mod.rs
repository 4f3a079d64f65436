pub mod schema;

use std::sync::Arc;

use sqlx::PgPool;

use crate::storage::{Collection, MemoryCollection, PgCollection, StorageError};

pub use schema::{body_fields, FieldDescriptor, FieldType, Schema};

/// Schema-bound handle to a storage collection
///
/// Built once at startup and shared read-only by every generated handler.
pub struct Model {
    name: String,
    schema: Schema,
    collection: Arc<dyn Collection>,
}

impl Model {
    pub fn new(name: impl Into<String>, schema: Schema, collection: Arc<dyn Collection>) -> Self {
        Self {
            name: name.into(),
            schema,
            collection,
        }
    }

    /// Model backed by an in-process collection honoring the schema's unique fields
    pub fn in_memory(name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        let collection =
            MemoryCollection::new(name.clone()).with_unique_fields(schema.unique_fields());
        Self::new(name, schema, Arc::new(collection))
    }

    /// Model backed by a PostgreSQL table, created along with its unique indexes if missing
    pub async fn postgres(
        name: impl Into<String>,
        schema: Schema,
        pool: PgPool,
    ) -> Result<Self, StorageError> {
        let name = name.into();
        let collection = PgCollection::new(name.clone(), pool)?;
        collection.ensure(&schema.unique_fields()).await?;
        Ok(Self::new(name, schema, Arc::new(collection)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn collection(&self) -> &dyn Collection {
        self.collection.as_ref()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("collection", &self.collection.name())
            .field("schema", &self.schema)
            .finish()
    }
}
