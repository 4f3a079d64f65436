//! CRUD route generation for schema-bound models.
//!
//! ```ignore
//! let users = Arc::new(Model::in_memory("users", schema));
//! let app = Router::new().nest("/api/users", RouteGenerator::default_router(users));
//! ```
//!
//! Each registration adds one verb+path to the router:
//!
//! | operation  | route                                |
//! |------------|--------------------------------------|
//! | `list_all` | `GET /`                              |
//! | `get_one`  | `GET /:_id` or `GET /<key>/:<key>`   |
//! | `create`   | `POST /`                             |
//! | `update`   | `PUT /:_id`                          |
//! | `delete`   | `DELETE /:_id`                       |

pub mod filter;
pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Path,
    http::Method,
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::Value;
use tracing::debug;

use crate::model::Model;
use crate::storage::{Projection, ID_FIELD};

pub use filter::{FieldWhitelist, Filter, Middleware};
pub use handlers::WriteEncoding;

/// A verb+path pair registered on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRegistration {
    pub method: Method,
    pub path: String,
}

impl std::fmt::Display for RouteRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Registers generated CRUD handlers for one model on a router
pub struct RouteGenerator<S = ()> {
    router: Router<S>,
    model: Arc<Model>,
    encoding: WriteEncoding,
    registrations: Vec<RouteRegistration>,
}

impl<S> RouteGenerator<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(router: Router<S>, model: Arc<Model>) -> Self {
        Self {
            router,
            model,
            encoding: WriteEncoding::default(),
            registrations: Vec::new(),
        }
    }

    /// Choose how create and update responses encode the persisted document
    pub fn with_encoding(mut self, encoding: WriteEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn registrations(&self) -> &[RouteRegistration] {
        &self.registrations
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }

    /// `GET /` returning every document
    pub fn list_all(self, fields: Option<Projection>, filter: Option<Middleware>) -> Self {
        let model = self.model.clone();
        let route = get(move || {
            let model = model.clone();
            let fields = fields.clone();
            async move { handlers::list_all(&model, fields.as_ref()).await }
        });
        self.register(Method::GET, "/".to_string(), route, filter.as_ref())
    }

    /// `GET /:_id`, or `GET /<key>/:<key>` for any other key field
    pub fn get_one(
        self,
        key_field: Option<&str>,
        fields: Option<Projection>,
        filter: Option<Middleware>,
    ) -> Self {
        let key = key_field.unwrap_or(ID_FIELD).to_string();
        assert!(
            !key.is_empty() && !key.contains(|c| matches!(c, '/' | ':' | '*')),
            "invalid key field for route generation: {:?}",
            key
        );
        let path = key_path(&key);

        let model = self.model.clone();
        let route = get(move |Path(params): Path<HashMap<String, String>>| {
            let model = model.clone();
            let key = key.clone();
            let fields = fields.clone();
            async move { handlers::get_one(&model, &key, &params, fields.as_ref()).await }
        });
        self.register(Method::GET, path, route, filter.as_ref())
    }

    /// `POST /` creating a document from the declared fields of the body
    pub fn create(self, filter: Option<Filter>) -> Self {
        let (middleware, whitelist) = Filter::split(filter);
        let encoding = self.encoding;

        let model = self.model.clone();
        let route = post(move |Json(body): Json<Value>| {
            let model = model.clone();
            let whitelist = whitelist.clone();
            async move { handlers::create(&model, whitelist.as_ref(), encoding, body).await }
        });
        self.register(Method::POST, "/".to_string(), route, middleware.as_ref())
    }

    /// `PUT /:_id` copying declared body fields onto the stored document
    pub fn update(self, filter: Option<Filter>) -> Self {
        let (middleware, whitelist) = Filter::split(filter);
        let encoding = self.encoding;

        let model = self.model.clone();
        let route = put(
            move |Path(params): Path<HashMap<String, String>>, Json(body): Json<Value>| {
                let model = model.clone();
                let whitelist = whitelist.clone();
                async move {
                    let id = params.get(ID_FIELD).cloned().unwrap_or_default();
                    handlers::update(&model, &id, whitelist.as_ref(), encoding, body).await
                }
            },
        );
        self.register(Method::PUT, key_path(ID_FIELD), route, middleware.as_ref())
    }

    /// `DELETE /:_id`
    pub fn delete(self, filter: Option<Middleware>) -> Self {
        let model = self.model.clone();
        let route = delete(move |Path(params): Path<HashMap<String, String>>| {
            let model = model.clone();
            async move { handlers::delete(&model, &params).await }
        });
        self.register(Method::DELETE, key_path(ID_FIELD), route, filter.as_ref())
    }

    /// The five conventional routes with no projection and no filters
    pub fn all_crud(self) -> Self {
        self.list_all(None, None)
            .get_one(None, None, None)
            .create(None)
            .update(None)
            .delete(None)
    }

    fn register(
        mut self,
        method: Method,
        path: String,
        route: MethodRouter<S>,
        filter: Option<&Middleware>,
    ) -> Self {
        let route = match filter {
            Some(middleware) => middleware.wrap(route),
            None => route,
        };

        debug!("Registering {} {} for {}", method, path, self.model.name());
        self.router = self.router.route(&path, route);
        self.registrations.push(RouteRegistration { method, path });
        self
    }
}

impl RouteGenerator<()> {
    /// Fresh router carrying the full CRUD surface for `model`
    pub fn default_router(model: Arc<Model>) -> Router {
        RouteGenerator::new(Router::new(), model).all_crud().into_router()
    }
}

/// `_id` sits directly under the collection root; other keys get a named segment
fn key_path(key: &str) -> String {
    if key == ID_FIELD {
        format!("/:{}", key)
    } else {
        format!("/{}/:{}", key, key)
    }
}

/// Add the five conventional CRUD routes for `model` to `router`
pub fn register_all_crud<S>(router: Router<S>, model: Arc<Model>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    RouteGenerator::new(router, model).all_crud().into_router()
}

/// Fresh router with the conventional CRUD routes, ready to be nested by the caller
pub fn default_crud_router(model: Arc<Model>) -> Router {
    RouteGenerator::default_router(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, Schema};

    fn users() -> Arc<Model> {
        Arc::new(Model::in_memory(
            "users",
            Schema::new()
                .unique_field("username", FieldType::String)
                .field("age", FieldType::Number),
        ))
    }

    #[test]
    fn key_paths() {
        assert_eq!(key_path("_id"), "/:_id");
        assert_eq!(key_path("username"), "/username/:username");
    }

    #[test]
    fn all_crud_registers_five_distinct_routes() {
        let generator = RouteGenerator::new(Router::<()>::new(), users()).all_crud();
        let routes: Vec<String> = generator
            .registrations()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            routes,
            vec!["GET /", "GET /:_id", "POST /", "PUT /:_id", "DELETE /:_id"]
        );
    }

    #[test]
    fn get_one_by_field_uses_named_segment() {
        let generator =
            RouteGenerator::new(Router::<()>::new(), users()).get_one(Some("username"), None, None);
        assert_eq!(
            generator.registrations(),
            &[RouteRegistration {
                method: Method::GET,
                path: "/username/:username".to_string(),
            }]
        );
    }

    #[test]
    #[should_panic(expected = "invalid key field")]
    fn get_one_rejects_path_syntax_in_key() {
        let _ = RouteGenerator::new(Router::<()>::new(), users()).get_one(Some("a/b"), None, None);
    }
}
