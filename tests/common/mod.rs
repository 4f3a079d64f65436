#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use tokio::task::JoinHandle;

use autocrud::model::{FieldType, Model, Schema};
use autocrud::storage::{Collection, Document, MemoryCollection, Projection, Query, StorageError};

pub struct TestServer {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve `app` on a free local port for the duration of a test
pub async fn spawn(app: Router) -> Result<TestServer> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        base_url: format!("http://{}", addr),
        handle,
    })
}

/// Mount a model router the way callers do, under /api/<name>
pub async fn spawn_nested(name: &str, router: Router) -> Result<TestServer> {
    spawn(Router::new().nest(&format!("/api/{}", name), router)).await
}

pub fn users_schema() -> Schema {
    Schema::new()
        .unique_field("username", FieldType::String)
        .field("age", FieldType::Number)
}

/// Collection wrapper recording every storage call
pub struct RecordingCollection {
    inner: MemoryCollection,
    calls: AtomicUsize,
    queries: Mutex<Vec<Query>>,
}

impl RecordingCollection {
    pub fn new(inner: MemoryCollection) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }

    fn record(&self, query: Option<&Query>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(query) = query {
            self.queries.lock().unwrap().push(query.clone());
        }
    }
}

#[async_trait]
impl Collection for RecordingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, query: &Query, projection: Option<&Projection>) -> Result<Vec<Document>, StorageError> {
        self.record(Some(query));
        self.inner.find(query, projection).await
    }

    async fn find_one(&self, query: &Query, projection: Option<&Projection>) -> Result<Option<Document>, StorageError> {
        self.record(Some(query));
        self.inner.find_one(query, projection).await
    }

    async fn insert(&self, doc: Document) -> Result<Document, StorageError> {
        self.record(None);
        self.inner.insert(doc).await
    }

    async fn save(&self, id: &str, doc: Document) -> Result<Option<Document>, StorageError> {
        self.record(None);
        self.inner.save(id, doc).await
    }

    async fn remove(&self, query: &Query) -> Result<u64, StorageError> {
        self.record(Some(query));
        self.inner.remove(query).await
    }
}

/// Users model whose storage calls can be inspected
pub fn recording_users() -> (Arc<Model>, Arc<RecordingCollection>) {
    let schema = users_schema();
    let collection = Arc::new(RecordingCollection::new(
        MemoryCollection::new("users").with_unique_fields(schema.unique_fields()),
    ));
    let model = Arc::new(Model::new("users", schema, collection.clone()));
    (model, collection)
}

/// Collection whose every call fails with a generic storage error
pub struct BrokenCollection;

#[async_trait]
impl Collection for BrokenCollection {
    fn name(&self) -> &str {
        "broken"
    }

    async fn find(&self, _: &Query, _: Option<&Projection>) -> Result<Vec<Document>, StorageError> {
        Err(StorageError::InvalidCollection("broken".into()))
    }

    async fn find_one(&self, _: &Query, _: Option<&Projection>) -> Result<Option<Document>, StorageError> {
        Err(StorageError::InvalidCollection("broken".into()))
    }

    async fn insert(&self, _: Document) -> Result<Document, StorageError> {
        Err(StorageError::InvalidCollection("broken".into()))
    }

    async fn save(&self, _: &str, _: Document) -> Result<Option<Document>, StorageError> {
        Err(StorageError::InvalidCollection("broken".into()))
    }

    async fn remove(&self, _: &Query) -> Result<u64, StorageError> {
        Err(StorageError::InvalidCollection("broken".into()))
    }
}

/// Collection whose documents disappear right after they are read, as when a
/// concurrent delete lands between an update's lookup and its save
pub struct VanishingCollection {
    inner: MemoryCollection,
}

impl VanishingCollection {
    pub fn new(inner: MemoryCollection) -> Self {
        Self { inner }
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl Collection for VanishingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, query: &Query, projection: Option<&Projection>) -> Result<Vec<Document>, StorageError> {
        self.inner.find(query, projection).await
    }

    async fn find_one(&self, query: &Query, projection: Option<&Projection>) -> Result<Option<Document>, StorageError> {
        let found = self.inner.find_one(query, projection).await?;
        self.inner.remove(query).await?;
        Ok(found)
    }

    async fn insert(&self, doc: Document) -> Result<Document, StorageError> {
        self.inner.insert(doc).await
    }

    async fn save(&self, id: &str, doc: Document) -> Result<Option<Document>, StorageError> {
        self.inner.save(id, doc).await
    }

    async fn remove(&self, query: &Query) -> Result<u64, StorageError> {
        self.inner.remove(query).await
    }
}

/// Decode a create/update response carrying the document as a JSON string
pub fn decode_double(body: &serde_json::Value) -> Result<serde_json::Value> {
    let inner = body.as_str().context("expected a JSON string body")?;
    Ok(serde_json::from_str(inner)?)
}
