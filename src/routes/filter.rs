use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::{from_fn, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use futures::future::BoxFuture;

use crate::storage::Document;

type MiddlewareFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// Caller-supplied hook run in front of a generated handler.
///
/// The hook receives the request and the downstream handler as `Next`. It
/// decides whether to call `next.run(request)` or answer on its own.
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn new<F, Fut, Out>(hook: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Out> + Send + 'static,
        Out: IntoResponse,
    {
        Self(Arc::new(move |request, next| {
            let fut = hook(request, next);
            Box::pin(async move { fut.await.into_response() })
        }))
    }

    /// Layer this hook onto a single method route
    pub(crate) fn wrap<S>(&self, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let hook = self.0.clone();
        route.layer(from_fn(move |request: Request, next: Next| {
            let hook = hook.clone();
            async move { hook(request, next).await }
        }))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware(..)")
    }
}

/// Body keys a caller allows through on create and update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldWhitelist {
    fields: BTreeSet<String>,
}

impl FieldWhitelist {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Strip every key not on the whitelist
    pub fn apply(&self, body: &mut Document) {
        body.retain(|key, _| self.fields.contains(key));
    }
}

/// Access hook for write routes: either middleware or a body whitelist
#[derive(Debug, Clone)]
pub enum Filter {
    Middleware(Middleware),
    FieldWhitelist(FieldWhitelist),
}

impl Filter {
    pub fn middleware<F, Fut, Out>(hook: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Out> + Send + 'static,
        Out: IntoResponse,
    {
        Filter::Middleware(Middleware::new(hook))
    }

    pub fn whitelist<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::FieldWhitelist(FieldWhitelist::new(fields))
    }

    /// Split into the middleware and whitelist halves, at most one of which is set
    pub(crate) fn split(filter: Option<Filter>) -> (Option<Middleware>, Option<FieldWhitelist>) {
        match filter {
            Some(Filter::Middleware(m)) => (Some(m), None),
            Some(Filter::FieldWhitelist(w)) => (None, Some(w)),
            None => (None, None),
        }
    }
}

impl From<Middleware> for Filter {
    fn from(m: Middleware) -> Self {
        Filter::Middleware(m)
    }
}

impl From<FieldWhitelist> for Filter {
    fn from(w: FieldWhitelist) -> Self {
        Filter::FieldWhitelist(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn whitelist_strips_unlisted_keys() {
        let whitelist = FieldWhitelist::new(["username"]);
        let mut body = json!({"username": "al", "age": 9, "admin": true})
            .as_object()
            .cloned()
            .unwrap();
        whitelist.apply(&mut body);
        assert_eq!(Value::Object(body), json!({"username": "al"}));
        assert!(whitelist.allows("username"));
        assert!(!whitelist.allows("age"));
    }

    #[test]
    fn split_separates_variants() {
        let (m, w) = Filter::split(Some(Filter::whitelist(["a"])));
        assert!(m.is_none());
        assert!(w.is_some());

        let (m, w) = Filter::split(Some(Filter::middleware(|req: Request, next: Next| async move {
            next.run(req).await
        })));
        assert!(m.is_some());
        assert!(w.is_none());

        let (m, w) = Filter::split(None);
        assert!(m.is_none() && w.is_none());
    }
}
