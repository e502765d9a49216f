use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::interceptor::{InterceptorContext, RequestInterceptor, ResponseInterceptor};

/// Adds a static `Authorization: Basic` header to every attempt.
///
/// A 401 asks for a replay; since the credentials never change, a server that
/// keeps rejecting them ends in `RetryBudgetExceeded`.
pub struct BasicAuthInterceptor {
    header: HeaderValue,
}

impl BasicAuthInterceptor {
    pub fn new(username: &str, password: &str) -> Result<Self> {
        Ok(Self {
            header: basic_auth_header(username, password)?,
        })
    }
}

/// `Basic base64(username:password)`, flagged sensitive.
pub fn basic_auth_header(username: &str, password: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    let mut header = HeaderValue::from_str(&format!("Basic {}", encoded))
        .map_err(|e| Error::Configuration(format!("invalid basic auth header: {}", e)))?;
    header.set_sensitive(true);
    Ok(header)
}

#[async_trait]
impl RequestInterceptor for BasicAuthInterceptor {
    async fn intercept_request(&self, mut context: InterceptorContext) -> InterceptorContext {
        context
            .request_mut()
            .headers_mut()
            .insert(AUTHORIZATION, self.header.clone());
        context
    }
}

#[async_trait]
impl ResponseInterceptor for BasicAuthInterceptor {
    async fn intercept_response(&self, mut context: InterceptorContext) -> InterceptorContext {
        if context.status() == Some(StatusCode::UNAUTHORIZED) {
            tracing::debug!("Basic credentials rejected, requesting replay");
            context.set_replay(true);
        }
        context
    }
}
