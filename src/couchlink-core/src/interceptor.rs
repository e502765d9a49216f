//! Extension points around each HTTP attempt.
//!
//! A pipeline keeps two ordered lists: request interceptors run before the
//! request is sent, response interceptors after the response headers arrive.
//! One type may implement either trait or both.

use async_trait::async_trait;
use reqwest::{Request, Response, StatusCode};

/// Per-attempt state handed through the interceptor chain.
///
/// A fresh context is created for every attempt. Response interceptors only
/// see the response by reference, so the body stays unread for the caller.
#[derive(Debug)]
pub struct InterceptorContext {
    request: Request,
    response: Option<Response>,
    replay: bool,
}

impl InterceptorContext {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
            replay: false,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Status of the received response, if the transport call has completed.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(Response::status)
    }

    /// Whether a response interceptor asked for the request to be sent again.
    pub fn replay(&self) -> bool {
        self.replay
    }

    pub fn set_replay(&mut self, replay: bool) {
        self.replay = replay;
    }

    pub(crate) fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub(crate) fn into_response(self) -> Option<Response> {
        self.response
    }
}

/// Runs before a request is sent; may add or change headers.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept_request(&self, context: InterceptorContext) -> InterceptorContext;
}

/// Runs after a response is received; may inspect status and headers and set
/// the replay flag.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept_response(&self, context: InterceptorContext) -> InterceptorContext;
}
