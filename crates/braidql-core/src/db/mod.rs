//! Database layer: adapters, factory, and schema types.
//!
//! Two engines are supported behind one [`DatabaseAdapter`] trait: a
//! relational adapter (`PostgreSQL`) and a document adapter (`MongoDB`).
//! The [`AdapterFactory`] owns every adapter and pool in the process,
//! keyed per account under the fixed names `"postgres"` and `"mongodb"`.

pub mod factory;
pub mod mongodb;
pub mod postgres;
pub mod traits;
pub mod types;

pub use factory::{AccountAdapters, AdapterFactory, LiveAdapterBuilder};
pub use mongodb::MongoAdapter;
pub use postgres::PostgresAdapter;
pub use traits::{AdapterBuilder, DatabaseAdapter, PoolSettings, DEFAULT_MAX_ROWS};
pub use types::{
    CollectionSchema, ColumnSchema, DatabaseSchema, DatabaseType, FieldSchema, JsonRow,
    QueryParam, Relationship, TableSchema,
};
