//! couchlink Client Library
//!
//! Async client for CouchDB-compatible document databases: database, document,
//! index and query operations over the interceptor-driven HTTP pipeline from
//! `couchlink-core`.

mod client;
mod database;
mod index;
mod query;

pub use client::{Client, ClientBuilder};
pub use database::Database;
pub use index::{CreatedIndex, JsonIndex, TextIndex};
pub use query::{FindQuery, QueryPage, UseIndex};

pub use couchlink_core::{
    AuthScheme, BasicAuthInterceptor, ClientConfig, CookieInterceptor, DocumentRevision, Error,
    ErrorKind, Index, IndexType, InterceptorContext, Operation, RequestInterceptor,
    ResponseInterceptor, Result, SortField, SortOrder, TextFieldType, TextIndexField,
};
