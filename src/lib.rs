pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod routes;
pub mod server;
pub mod storage;

pub use error::ApiError;
pub use model::{FieldDescriptor, FieldType, Model, Schema};
pub use routes::{
    default_crud_router, register_all_crud, FieldWhitelist, Filter, Middleware, RouteGenerator,
    RouteRegistration, WriteEncoding,
};
pub use storage::{Collection, Document, MemoryCollection, PgCollection, Projection, Query, StorageError};
