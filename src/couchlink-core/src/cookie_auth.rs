use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::Result;
use crate::interceptor::{InterceptorContext, RequestInterceptor, ResponseInterceptor};
use crate::pipeline::build_transport;
use crate::redact::redact_url;

/// Session-cookie authentication.
///
/// Before each attempt the cached session cookie is attached, fetching one
/// from `/_session` first if none is cached. A 401 on a protected request
/// fetches a fresh cookie and asks for a replay if that succeeded.
///
/// The exchange gives up for the rest of the interceptor's lifetime when it is
/// rejected with 401, answered with another non-5xx error status, or answered
/// with a 2xx body that is not readable JSON. After that requests go through
/// without a cookie. Server errors and transport failures (including a
/// timed-out exchange) only cost the current attempt its cookie. Exchange
/// failures are logged, never returned.
pub struct CookieInterceptor {
    client: Client,
    username: String,
    password: String,
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    cookie: Option<String>,
    stop_retrying: bool,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    ok: bool,
}

impl CookieInterceptor {
    /// Uses its own HTTP client with the default request timeout.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_timeout(username, password, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Uses its own HTTP client; an exchange slower than `timeout` yields no cookie.
    pub fn with_timeout(
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = build_transport(timeout, false)?;
        Ok(Self::with_client(client, username, password))
    }

    /// Shares an existing client (and its connection pool and timeout).
    pub fn with_client(
        client: Client,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            username: username.into(),
            password: password.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// The cookie currently cached, if any.
    pub async fn session_cookie(&self) -> Option<String> {
        self.state.lock().await.cookie.clone()
    }

    /// Whether cookie acquisition has been given up for good.
    pub async fn is_disabled(&self) -> bool {
        self.state.lock().await.stop_retrying
    }

    /// POST the credentials to the session endpoint of `url`'s server.
    ///
    /// Called with the state lock held so concurrent requests never run two
    /// exchanges at once.
    async fn request_cookie(&self, state: &mut SessionState, url: &Url) -> Option<String> {
        let session_url = session_endpoint(url);
        tracing::debug!(url = %redact_url(&session_url), "Requesting session cookie");

        let response = match self
            .client
            .post(session_url.clone())
            .form(&[("name", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reach session endpoint");
                return None;
            }
        };

        let status = response.status();
        if status.is_success() {
            let cookie = last_set_cookie(response.headers());
            match response.json::<SessionResponse>().await {
                Ok(session) if session.ok => {
                    if cookie.is_none() {
                        tracing::warn!("Session started but response carried no Set-Cookie header");
                    }
                    cookie
                }
                Ok(_) => {
                    tracing::warn!("Session response did not report ok: true");
                    None
                }
                Err(e) => {
                    state.stop_retrying = true;
                    tracing::error!(
                        error = %e,
                        "Unreadable session response, cookie authentication will not be attempted again"
                    );
                    None
                }
            }
        } else if status == StatusCode::UNAUTHORIZED {
            state.stop_retrying = true;
            tracing::warn!(
                "Credentials are incorrect, cookie authentication will not be attempted again"
            );
            None
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Failed to get cookie from server");
            None
        } else {
            state.stop_retrying = true;
            tracing::warn!(
                status = status.as_u16(),
                "Failed to get cookie from server, cookie authentication will not be attempted again"
            );
            None
        }
    }
}

#[async_trait]
impl RequestInterceptor for CookieInterceptor {
    async fn intercept_request(&self, mut context: InterceptorContext) -> InterceptorContext {
        let mut state = self.state.lock().await;
        if state.stop_retrying {
            return context;
        }

        if state.cookie.is_none() {
            let url = context.request().url().clone();
            let cookie = self.request_cookie(&mut state, &url).await;
            state.cookie = cookie;
        }

        if let Some(cookie) = &state.cookie {
            match HeaderValue::from_str(cookie) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    context.request_mut().headers_mut().insert(COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Session cookie is not a valid header value"),
            }
        }
        context
    }
}

#[async_trait]
impl ResponseInterceptor for CookieInterceptor {
    async fn intercept_response(&self, mut context: InterceptorContext) -> InterceptorContext {
        if context.status() != Some(StatusCode::UNAUTHORIZED) {
            return context;
        }

        let sent = context
            .request()
            .headers()
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut state = self.state.lock().await;
        if state.stop_retrying {
            context.set_replay(false);
            return context;
        }

        // Another request already refreshed the session while this one was in flight.
        if let Some(current) = &state.cookie {
            if sent.as_deref() != Some(current.as_str()) {
                context.set_replay(true);
                return context;
            }
        }

        let url = context.request().url().clone();
        let cookie = self.request_cookie(&mut state, &url).await;
        context.set_replay(cookie.is_some());
        state.cookie = cookie;
        context
    }
}

/// `{scheme}://{host}[:port]/_session`, without user-info, query or fragment.
fn session_endpoint(url: &Url) -> Url {
    let mut session = url.clone();
    let _ = session.set_username("");
    let _ = session.set_password(None);
    session.set_path("/_session");
    session.set_query(None);
    session.set_fragment(None);
    session
}

/// The `name=value` pair of the last `Set-Cookie` header.
fn last_set_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .last()
        .and_then(|value| value.split(';').next())
        .map(|pair| pair.trim().to_string())
        .filter(|pair| !pair.is_empty())
}
