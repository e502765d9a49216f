//! The request pipeline every remote call goes through.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Response, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::interceptor::{InterceptorContext, RequestInterceptor, ResponseInterceptor};
use crate::redact::{format_headers, redact_url};

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// A request body already serialized to JSON.
#[derive(Debug, Clone)]
pub struct JsonBody(String);

impl JsonBody {
    pub fn new<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_string(value)
            .map(JsonBody)
            .map_err(Error::Serialization)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sends requests with global headers, interceptors and bounded replay.
///
/// Configuration is fixed at construction; one pipeline is shared by every
/// operation of a client and may be used concurrently.
pub struct HttpPipeline {
    client: Client,
    base_url: Url,
    global_headers: HeaderMap,
    max_attempts: u32,
    timeout: Duration,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl HttpPipeline {
    pub fn builder(base_url: Url) -> HttpPipelineBuilder {
        HttpPipelineBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn get(&self, uri: &str, headers: Option<&HeaderMap>) -> Result<Response> {
        self.send(Method::GET, uri, headers, None).await
    }

    pub async fn delete(&self, uri: &str, headers: Option<&HeaderMap>) -> Result<Response> {
        self.send(Method::DELETE, uri, headers, None).await
    }

    pub async fn put(
        &self,
        uri: &str,
        headers: Option<&HeaderMap>,
        body: Option<JsonBody>,
    ) -> Result<Response> {
        self.send(Method::PUT, uri, headers, body).await
    }

    pub async fn post(
        &self,
        uri: &str,
        headers: Option<&HeaderMap>,
        body: Option<JsonBody>,
    ) -> Result<Response> {
        self.send(Method::POST, uri, headers, body).await
    }

    /// Send one logical request.
    ///
    /// Each attempt builds a fresh request, runs the request interceptors,
    /// executes it and runs the response interceptors. If any of them set the
    /// replay flag the response is dropped and a new attempt starts, up to
    /// the configured number of attempts. Transport errors are returned
    /// immediately and never replayed.
    #[tracing::instrument(
        skip(self, method, uri, headers, body),
        fields(method = %method, url = tracing::field::Empty)
    )]
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: Option<&HeaderMap>,
        body: Option<JsonBody>,
    ) -> Result<Response> {
        let url = self.resolve(uri)?;
        tracing::Span::current().record("url", tracing::field::display(redact_url(&url)));

        for attempt in 1..=self.max_attempts {
            let mut context = InterceptorContext::new(self.build_request(&method, &url, headers, body.as_ref()));
            for interceptor in &self.request_interceptors {
                context = interceptor.intercept_request(context).await;
            }

            let request = context
                .request()
                .try_clone()
                .ok_or_else(|| Error::Configuration("request body cannot be replayed".to_string()))?;
            tracing::debug!(
                attempt,
                url = %redact_url(request.url()),
                headers = %format_headers(request.headers()),
                body = body.as_ref().map(JsonBody::as_str).unwrap_or("none"),
                "Http request"
            );

            let response = self.client.execute(request).await.map_err(|e| {
                tracing::debug!(attempt, error = %e, "Http request failed");
                Error::Transport(e)
            })?;
            tracing::debug!(
                attempt,
                status = response.status().as_u16(),
                headers = %format_headers(response.headers()),
                "Http response"
            );

            context.set_response(response);
            for interceptor in &self.response_interceptors {
                context = interceptor.intercept_response(context).await;
            }

            if !context.replay() {
                return context
                    .into_response()
                    .ok_or_else(|| Error::decode("response was lost in the interceptor chain"));
            }
            tracing::debug!(attempt, "Response interceptor requested replay");
        }

        tracing::warn!(limit = self.max_attempts, "Maximum number of attempts reached");
        Err(Error::RetryBudgetExceeded {
            limit: self.max_attempts,
        })
    }

    /// Absolute URIs are used as given, anything else is joined to the base URL.
    /// Credentials embedded in an absolute URI are rejected; authentication
    /// belongs to interceptors.
    fn resolve(&self, uri: &str) -> Result<Url> {
        let url = Url::parse(uri)
            .or_else(|_| self.base_url.join(uri))
            .map_err(|e| Error::Configuration(format!("invalid request URI: {}", e)))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::Configuration(format!(
                "request URI {} must not embed credentials",
                redact_url(&url)
            )));
        }
        Ok(url)
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        headers: Option<&HeaderMap>,
        body: Option<&JsonBody>,
    ) -> Request {
        let mut request = Request::new(method.clone(), url.clone());
        *request.timeout_mut() = Some(self.timeout);

        let request_headers = request.headers_mut();
        request_headers.extend(self.global_headers.clone());
        if let Some(headers) = headers {
            request_headers.extend(headers.clone());
        }
        request_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(body) = body {
            request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            *request.body_mut() = Some(body.0.clone().into());
        }
        request
    }
}

/// Build an HTTP client with the given timeout and TLS verification setting.
pub fn build_transport(timeout: Duration, insecure_skip_verify: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure_skip_verify)
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}

pub struct HttpPipelineBuilder {
    base_url: Url,
    client: Option<Client>,
    global_headers: HeaderMap,
    max_attempts: u32,
    timeout: Duration,
    insecure_skip_verify: bool,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    error: Option<Error>,
}

impl HttpPipelineBuilder {
    fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            base_url,
            client: None,
            global_headers: HeaderMap::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            insecure_skip_verify: false,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            error: None,
        }
    }

    /// Use an existing client instead of building one.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Add a header sent with every request.
    pub fn global_header(mut self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|name| {
                HeaderValue::from_str(value)
                    .map(|value| (name, value))
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok((name, mut value)) => {
                if crate::redact::is_credential_header(&name) {
                    value.set_sensitive(true);
                }
                self.global_headers.append(name, value);
            }
            Err(e) => {
                self.error.get_or_insert(Error::Configuration(format!(
                    "invalid global header '{}': {}",
                    name, e
                )));
            }
        }
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Register one instance in both chains.
    pub fn interceptor<I>(self, interceptor: Arc<I>) -> Self
    where
        I: RequestInterceptor + ResponseInterceptor + 'static,
    {
        self.request_interceptor(interceptor.clone())
            .response_interceptor(interceptor)
    }

    pub fn build(self) -> Result<HttpPipeline> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.base_url.username().is_empty() || self.base_url.password().is_some() {
            return Err(Error::Configuration(
                "base URL must not embed credentials".to_string(),
            ));
        }

        let client = match self.client {
            Some(client) => client,
            None => build_transport(self.timeout, self.insecure_skip_verify)?,
        };

        tracing::debug!(
            base_url = %self.base_url,
            max_attempts = self.max_attempts,
            request_interceptors = self.request_interceptors.len(),
            response_interceptors = self.response_interceptors.len(),
            "Http pipeline configured"
        );

        Ok(HttpPipeline {
            client,
            base_url: self.base_url,
            global_headers: self.global_headers,
            max_attempts: self.max_attempts,
            timeout: self.timeout,
            request_interceptors: self.request_interceptors,
            response_interceptors: self.response_interceptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_auth::BasicAuthInterceptor;
    use crate::cookie_auth::CookieInterceptor;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use reqwest::header::{AUTHORIZATION, COOKIE};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct AlwaysReplay {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ResponseInterceptor for AlwaysReplay {
        async fn intercept_response(&self, mut context: InterceptorContext) -> InterceptorContext {
            self.calls.fetch_add(1, Ordering::SeqCst);
            context.set_replay(true);
            context
        }
    }

    /// Replays until it has seen `remaining` responses.
    struct ReplayTimes {
        remaining: AtomicU32,
    }

    #[async_trait]
    impl ResponseInterceptor for ReplayTimes {
        async fn intercept_response(&self, mut context: InterceptorContext) -> InterceptorContext {
            let left = self.remaining.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining.store(left - 1, Ordering::SeqCst);
                context.set_replay(true);
            }
            context
        }
    }

    fn base(server: &MockServer) -> Url {
        Url::parse(&server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_sends_accept_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mydb"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/json; charset=UTF-8"))
            .and(body_json(json!({"stringKey": "nicestringvalue", "numberKey": 42})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server)).build().unwrap();
        let body = JsonBody::new(&json!({"stringKey": "nicestringvalue", "numberKey": 42})).unwrap();
        let response = pipeline.post("mydb", None, Some(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_verbs_and_global_headers() {
        let server = MockServer::start().await;
        for (verb, status) in [("PUT", 201), ("GET", 200), ("DELETE", 200)] {
            Mock::given(method(verb))
                .and(path("/mydb"))
                .and(header("x-global", "yes"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;
        }

        let pipeline = HttpPipeline::builder(base(&server))
            .global_header("X-Global", "yes")
            .build()
            .unwrap();

        assert_eq!(pipeline.put("mydb", None, None).await.unwrap().status(), 201);
        assert_eq!(pipeline.get("mydb", None).await.unwrap().status(), 200);
        assert_eq!(pipeline.delete("mydb", None).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn test_per_request_headers_override_global() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-mode", "request"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .global_header("x-mode", "global")
            .build()
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-mode", HeaderValue::from_static("request"));

        let response = pipeline.get("anything", Some(&headers)).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_replay_forever_stops_at_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(10)
            .mount(&server)
            .await;

        let interceptor = Arc::new(AlwaysReplay {
            calls: AtomicU32::new(0),
        });
        let pipeline = HttpPipeline::builder(base(&server))
            .response_interceptor(interceptor.clone())
            .build()
            .unwrap();

        let err = pipeline.get("mydb", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryBudgetExceeded);
        assert!(matches!(err, Error::RetryBudgetExceeded { limit: 10 }));
        assert_eq!(interceptor.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_custom_budget_is_honored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .max_attempts(3)
            .response_interceptor(Arc::new(AlwaysReplay {
                calls: AtomicU32::new(0),
            }))
            .build()
            .unwrap();

        let err = pipeline.get("mydb", None).await.unwrap_err();
        assert!(matches!(err, Error::RetryBudgetExceeded { limit: 3 }));
    }

    #[tokio::test]
    async fn test_replay_then_success_returns_final_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .expect(3)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .response_interceptor(Arc::new(ReplayTimes {
                remaining: AtomicU32::new(2),
            }))
            .build()
            .unwrap();

        let response = pipeline.get("mydb", None).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_basic_auth_rejected_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(401))
            .expect(4)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .max_attempts(4)
            .interceptor(Arc::new(BasicAuthInterceptor::new("user", "pass").unwrap()))
            .build()
            .unwrap();

        let err = pipeline.get("mydb", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryBudgetExceeded);
    }

    #[tokio::test]
    async fn test_basic_auth_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header(AUTHORIZATION.as_str(), "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .interceptor(Arc::new(BasicAuthInterceptor::new("user", "pass").unwrap()))
            .build()
            .unwrap();
        assert_eq!(pipeline.get("mydb", None).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn test_cookie_session_expiry_is_replayed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "AuthSession=old; Path=/")
                    .set_body_json(json!({"ok": true})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "AuthSession=new; Path=/")
                    .set_body_json(json!({"ok": true})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mydb"))
            .and(header(COOKIE.as_str(), "AuthSession=old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mydb"))
            .and(header(COOKIE.as_str(), "AuthSession=new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"db_name": "mydb"})))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .interceptor(Arc::new(CookieInterceptor::new("user", "pass").unwrap()))
            .build()
            .unwrap();

        let response = pipeline.get("mydb", None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_cookie_bad_credentials_surface_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_session"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mydb"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .interceptor(Arc::new(CookieInterceptor::new("user", "wrong").unwrap()))
            .build()
            .unwrap();

        // No replay loop: the 401 comes straight back, and the second call skips the exchange.
        assert_eq!(pipeline.get("mydb", None).await.unwrap().status(), 401);
        assert_eq!(pipeline.get("mydb", None).await.unwrap().status(), 401);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_replayed() {
        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let interceptor = Arc::new(AlwaysReplay {
            calls: AtomicU32::new(0),
        });
        let pipeline = HttpPipeline::builder(url)
            .timeout(Duration::from_secs(2))
            .response_interceptor(interceptor.clone())
            .build()
            .unwrap();

        let err = pipeline.get("mydb", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(interceptor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server))
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let err = pipeline.get("slow", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_relative_uris_resolve_under_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/couch/mydb/doc%2F1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/couch", server.uri())).unwrap();
        let pipeline = HttpPipeline::builder(base).build().unwrap();
        assert_eq!(pipeline.base_url().path(), "/couch/");
        assert_eq!(pipeline.get("mydb/doc%2F1", None).await.unwrap().status(), 200);
    }

    #[test]
    fn test_builder_rejects_bad_configuration() {
        let url = Url::parse("http://localhost:5984").unwrap();

        let err = HttpPipeline::builder(url.clone()).max_attempts(0).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = HttpPipeline::builder(url.clone())
            .global_header("bad header", "x")
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let with_user = Url::parse("http://admin:pw@localhost:5984").unwrap();
        let err = HttpPipeline::builder(with_user).build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_absolute_uri_with_credentials_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = HttpPipeline::builder(base(&server)).build().unwrap();
        let with_user = server.uri().replace("http://", "http://u:secret@") + "/db";

        let err = pipeline.get(&with_user, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.to_string().contains("secret"), "{}", err);
    }

    #[tokio::test]
    async fn test_absolute_uri_without_credentials_is_used_as_given() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/other/db"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/couch/", server.uri())).unwrap();
        let pipeline = HttpPipeline::builder(base).build().unwrap();
        let absolute = format!("{}/other/db", server.uri());
        assert_eq!(pipeline.get(&absolute, None).await.unwrap().status(), 200);
    }

    #[test]
    fn test_unserializable_body_fails_before_send() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "non-string keys are not JSON");
        let err = JsonBody::new(&map).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
