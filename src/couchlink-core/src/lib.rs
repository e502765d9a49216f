//! couchlink Core Library
//!
//! This crate provides the building blocks shared by the couchlink client:
//! - HTTP pipeline with request/response interceptors and bounded replay
//! - Basic and cookie session authentication interceptors
//! - Document and index codec for the CouchDB JSON wire format
//! - Error classification and client configuration

pub mod basic_auth;
pub mod codec;
pub mod config;
pub mod cookie_auth;
pub mod error;
pub mod interceptor;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod redact;

// Re-export commonly used types
pub use basic_auth::BasicAuthInterceptor;
pub use config::{AuthScheme, ClientConfig};
pub use cookie_auth::CookieInterceptor;
pub use error::{Error, ErrorKind, Operation, Result};
pub use interceptor::{InterceptorContext, RequestInterceptor, ResponseInterceptor};
pub use models::*;
pub use pipeline::{HttpPipeline, HttpPipelineBuilder, JsonBody};
