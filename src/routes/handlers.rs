use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::{body_fields, Model};
use crate::storage::{Document, Projection, Query, ID_FIELD};

use super::filter::FieldWhitelist;

pub type ApiResult<T> = Result<T, ApiError>;

/// How create and update responses carry the persisted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteEncoding {
    /// The document serialized to a string, then sent as a JSON string
    #[default]
    DoubleEncoded,
    /// The document sent as a JSON object
    Document,
}

impl WriteEncoding {
    pub fn from_flag(double_encode: bool) -> Self {
        if double_encode {
            WriteEncoding::DoubleEncoded
        } else {
            WriteEncoding::Document
        }
    }

    fn encode(self, doc: Document) -> ApiResult<Response> {
        match self {
            WriteEncoding::DoubleEncoded => {
                let inner = serde_json::to_string(&doc)?;
                Ok(Json(Value::String(inner)).into_response())
            }
            WriteEncoding::Document => Ok(Json(doc).into_response()),
        }
    }
}

/// GET / - every document, optionally projected
pub async fn list_all(model: &Model, fields: Option<&Projection>) -> ApiResult<Json<Vec<Document>>> {
    debug!("GET all from {}", model.name());
    let docs = model.collection().find(&Query::all(), fields).await?;
    Ok(Json(docs))
}

/// GET /:_id or /<key>/:<key> - single document by key equality
pub async fn get_one(
    model: &Model,
    key_field: &str,
    params: &HashMap<String, String>,
    fields: Option<&Projection>,
) -> ApiResult<Json<Option<Document>>> {
    let value = key_value(key_field, params).ok_or_else(|| {
        warn!("Rejected {} lookup on {}: invalid key value", key_field, model.name());
        ApiError::bad_request(format!("invalid value for '{}'", key_field))
    })?;

    debug!("GET {}={} from {}", key_field, value, model.name());
    let doc = model
        .collection()
        .find_one(&Query::eq(key_field, value), fields)
        .await?;
    Ok(Json(doc))
}

/// Path value usable as a lookup key.
///
/// `_id` must be a well-formed identifier and is normalized to the stored
/// lowercase hyphenated form.
fn key_value(key_field: &str, params: &HashMap<String, String>) -> Option<String> {
    let value = params.get(key_field).filter(|v| !v.is_empty())?;
    if key_field == ID_FIELD {
        let id = Uuid::parse_str(value).ok()?;
        return Some(id.hyphenated().to_string());
    }
    Some(value.clone())
}

/// Stored form of an id taken from a write path; unparseable ids pass through
fn normalize_id(id: &str) -> String {
    match Uuid::parse_str(id) {
        Ok(id) => id.hyphenated().to_string(),
        Err(_) => id.to_string(),
    }
}

/// POST / - new document from the declared fields of the body
pub async fn create(
    model: &Model,
    whitelist: Option<&FieldWhitelist>,
    encoding: WriteEncoding,
    body: Value,
) -> ApiResult<Response> {
    let mut body = body_fields(body);
    if let Some(whitelist) = whitelist {
        whitelist.apply(&mut body);
    }

    let doc = model.schema().instantiate(&body);
    let saved = model.collection().insert(doc).await?;

    debug!(
        "Created {} in {}",
        saved.get(ID_FIELD).and_then(|v| v.as_str()).unwrap_or_default(),
        model.name()
    );
    encoding.encode(saved)
}

/// PUT /:_id - copy declared body fields onto an existing document
pub async fn update(
    model: &Model,
    id: &str,
    whitelist: Option<&FieldWhitelist>,
    encoding: WriteEncoding,
    body: Value,
) -> ApiResult<Response> {
    let id = normalize_id(id);
    let id = id.as_str();
    let existing = model.collection().find_one(&Query::by_id(id), None).await?;
    let Some(mut doc) = existing else {
        warn!("Update of missing {} in {}", id, model.name());
        return Err(ApiError::not_found(format!("{} {} not found", model.name(), id)));
    };

    let mut body = body_fields(body);
    if let Some(whitelist) = whitelist {
        whitelist.apply(&mut body);
    }
    model.schema().copy_declared(&mut doc, &body);

    let Some(saved) = model.collection().save(id, doc).await? else {
        warn!("{} vanished from {} before it could be saved", id, model.name());
        return Err(ApiError::not_found(format!("{} {} not found", model.name(), id)));
    };
    debug!("Updated {} in {}", id, model.name());
    encoding.encode(saved)
}

/// DELETE /:_id
pub async fn delete(model: &Model, params: &HashMap<String, String>) -> ApiResult<StatusCode> {
    let id = match params.get(ID_FIELD).filter(|v| !v.trim().is_empty()) {
        Some(id) => normalize_id(id),
        None => {
            warn!("Delete on {} without an id", model.name());
            return Err(ApiError::bad_request("missing _id"));
        }
    };

    let removed = model.collection().remove(&Query::by_id(id.as_str())).await?;
    debug!("Removed {} document(s) with _id {} from {}", removed, id, model.name());

    if removed > 0 {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::not_found(format!("{} {} not found", model.name(), id)))
    }
}
