use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    project, value_as_text, Collection, Document, Projection, Query, StorageError, ID_FIELD,
};

/// In-process document collection
///
/// Documents are kept in insertion order. Fields listed as unique are checked
/// on every insert and save by their text form, the same way the PostgreSQL
/// expression indexes on `doc ->> field` compare them.
pub struct MemoryCollection {
    name: String,
    unique_fields: Vec<String>,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_fields: Vec::new(),
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn with_unique_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_unique(&self, existing: &[Document], candidate: &Document) -> Result<(), StorageError> {
        let candidate_id = candidate.get(ID_FIELD);
        for field in &self.unique_fields {
            let value = match candidate.get(field) {
                Some(Value::Null) | None => continue,
                Some(v) => value_as_text(v),
            };
            let conflict = existing
                .iter()
                .filter(|doc| doc.get(ID_FIELD) != candidate_id)
                .filter_map(|doc| doc.get(field))
                .any(|stored| !stored.is_null() && value_as_text(stored) == value);
            if conflict {
                return Err(StorageError::duplicate_key(field.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>, StorageError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|doc| query.matches(doc))
            .cloned()
            .map(|doc| project(doc, projection))
            .collect())
    }

    async fn find_one(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StorageError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|doc| query.matches(doc))
            .cloned()
            .map(|doc| project(doc, projection)))
    }

    async fn insert(&self, mut doc: Document) -> Result<Document, StorageError> {
        let id = Uuid::new_v4().to_string();
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let mut documents = self.documents.write().await;
        self.check_unique(&documents, &doc)?;
        documents.push(doc.clone());

        debug!("Inserted {} into memory collection {}", id, self.name);
        Ok(doc)
    }

    async fn save(&self, id: &str, mut doc: Document) -> Result<Option<Document>, StorageError> {
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut documents = self.documents.write().await;
        let Some(index) = documents
            .iter()
            .position(|existing| existing.get(ID_FIELD).and_then(Value::as_str) == Some(id))
        else {
            debug!("Save of missing {} in memory collection {}", id, self.name);
            return Ok(None);
        };

        self.check_unique(&documents, &doc)?;
        documents[index] = doc.clone();
        Ok(Some(doc))
    }

    async fn remove(&self, query: &Query) -> Result<u64, StorageError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|doc| !query.matches(doc));
        Ok((before - documents.len()) as u64)
    }
}
