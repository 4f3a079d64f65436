pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::StorageError;
pub use memory::MemoryCollection;
pub use postgres::PgCollection;

/// Name of the identifier key every stored document carries
pub const ID_FIELD: &str = "_id";

/// A stored or to-be-stored document
pub type Document = Map<String, Value>;

/// Selection criteria for collection reads and removals
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every document
    All,
    /// Single-field equality
    Eq { field: String, value: Value },
}

impl Query {
    pub fn all() -> Self {
        Query::All
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq(ID_FIELD, Value::String(id.into()))
    }

    /// Check whether a document satisfies this query.
    ///
    /// A string criterion also matches numbers and booleans whose textual form
    /// is identical, since path parameters always arrive as strings.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::All => true,
            Query::Eq { field, value } => match doc.get(field) {
                Some(stored) => values_equal(stored, value),
                None => false,
            },
        }
    }
}

fn values_equal(stored: &Value, wanted: &Value) -> bool {
    if stored == wanted {
        return true;
    }
    match (stored, wanted) {
        (Value::Number(n), Value::String(s)) => n.to_string() == *s,
        (Value::Bool(b), Value::String(s)) => b.to_string() == *s,
        _ => false,
    }
}

/// Render a criterion value the way it is compared against stored text
pub(crate) fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Subset of fields returned from a read. `_id` is always kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn apply(&self, doc: Document) -> Document {
        if self.fields.is_empty() {
            return doc;
        }
        doc.into_iter()
            .filter(|(key, _)| key == ID_FIELD || self.fields.iter().any(|f| f == key))
            .collect()
    }
}

/// Apply an optional projection
pub(crate) fn project(doc: Document, projection: Option<&Projection>) -> Document {
    match projection {
        Some(p) => p.apply(doc),
        None => doc,
    }
}

/// Schema-agnostic storage capability the generated handlers call into
#[async_trait]
pub trait Collection: Send + Sync {
    /// Collection name used for logging and table naming
    fn name(&self) -> &str;

    async fn find(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>, StorageError>;

    async fn find_one(
        &self,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StorageError>;

    /// Persist a new document, assigning its `_id`
    async fn insert(&self, doc: Document) -> Result<Document, StorageError>;

    /// Persist an existing document under `id`. `None` when no document has that id.
    async fn save(&self, id: &str, doc: Document) -> Result<Option<Document>, StorageError>;

    /// Remove matching documents, returning how many were removed
    async fn remove(&self, query: &Query) -> Result<u64, StorageError>;
}
