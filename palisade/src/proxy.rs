// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// HTTP proxy embedding
//
// Responsibilities:
// - Apply the filter callbacks around an injected UpstreamClient
// - Request path: header scrub, body scan, refusal short-circuit
// - Response path: buffered rewrite, or streaming via the accumulator
// - Heartbeat endpoint

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ReloadingConfig;
use crate::deny::Refusal;
use crate::filter::{Filter, RequestVerdict, ResponseMode, ResponseVerdict};

/// Upper bound on buffered request/response bodies.
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data forwarded to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response received from the upstream provider.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body: Body::from(body),
        }
    }
}

/// Errors that can occur during upstream forwarding.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, public_message) = match &self {
            ProxyError::UpstreamFailure(_) => {
                (StatusCode::BAD_GATEWAY, "upstream request failed")
            }
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream request timed out")
            }
        };
        (status, public_message.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the HTTP client that forwards requests upstream.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

/// Production upstream client: forwards to a fixed base URL via reqwest.
pub struct ReqwestUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestUpstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let path = request
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let mut headers = request.headers;
        headers.remove(header::HOST);

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::UpstreamTimeout(e.to_string())
                } else {
                    ProxyError::UpstreamFailure(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        Ok(ProxyResponse {
            status,
            headers,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub config: Arc<ReloadingConfig>,
}

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// Build the axum router. The upstream client is injected -- no side
/// effects, no hard-coded clients.
pub fn build_router(upstream: Arc<dyn UpstreamClient>, config: Arc<ReloadingConfig>) -> Router {
    let state = AppState { upstream, config };

    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .fallback(filter_handler)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Applies the full filter pipeline around the upstream call.
async fn filter_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let filter = Filter::new(state.config.current());
    let mut ctx = filter.context();

    let (mut parts, body) = request.into_parts();
    filter.on_request_headers(&mut ctx, &mut parts.headers);

    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {e}"),
            )
                .into_response()
        }
    };

    let outbound = match filter.on_request_body(&mut ctx, &body_bytes) {
        RequestVerdict::Continue => body_bytes,
        RequestVerdict::Replace(new_body) => Bytes::from(new_body),
        RequestVerdict::Respond(refusal) => return refusal_response(&refusal),
    };

    let upstream_request = ProxyRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body: outbound,
    };
    let upstream_response = match state.upstream.forward(upstream_request).await {
        Ok(response) => response,
        Err(e) => return e.into_response(),
    };

    match filter.on_response_headers(&mut ctx, &upstream_response.headers) {
        ResponseMode::Buffered => buffered_response(filter, ctx, upstream_response).await,
        ResponseMode::Streaming => streaming_response(filter, ctx, upstream_response),
    }
}

async fn buffered_response(
    filter: Filter,
    mut ctx: crate::context::FilterContext,
    upstream: ProxyResponse,
) -> Response {
    let ProxyResponse {
        status,
        mut headers,
        body,
    } = upstream;

    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return ProxyError::UpstreamFailure(format!("failed to read upstream body: {e}"))
                .into_response()
        }
    };

    match filter.on_response_body(&mut ctx, &body_bytes) {
        ResponseVerdict::Continue => build_response(status, headers, Body::from(body_bytes)),
        ResponseVerdict::Replace(new_body) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(new_body.len()));
            build_response(status, headers, Body::from(new_body))
        }
        ResponseVerdict::Respond(refusal) => refusal_response(&refusal),
    }
}

fn streaming_response(filter: Filter, mut ctx: crate::context::FilterContext, upstream: ProxyResponse) -> Response {
    let ProxyResponse {
        status,
        mut headers,
        body,
    } = upstream;

    let (tx, rx) = mpsc::channel::<Bytes>(64);
    let mut input = body.into_data_stream();

    tokio::spawn(async move {
        while let Some(next) = input.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(_) => break, // upstream torn down
            };
            let out = filter.on_streaming_response_body(&mut ctx, &chunk, false);
            if !out.is_empty() && tx.send(Bytes::from(out)).await.is_err() {
                return; // client disconnected
            }
        }
        // Upstream closed: final flush with an empty last chunk.
        let out = filter.on_streaming_response_body(&mut ctx, &[], true);
        if !out.is_empty() {
            let _ = tx.send(Bytes::from(out)).await;
        }
    });

    // The filter may shorten the stream; the host recomputes framing.
    headers.remove(header::CONTENT_LENGTH);
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    build_response(status, headers, Body::from_stream(stream))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::builder().status(status);
    if let Some(h) = response.headers_mut() {
        *h = headers;
    }
    response.body(body).unwrap()
}

fn refusal_response(refusal: &Refusal) -> Response {
    let status = StatusCode::from_u16(refusal.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in refusal.headers() {
            if let (Ok(name), Ok(value)) =
                (name.parse::<HeaderName>(), HeaderValue::from_str(&value))
            {
                headers.insert(name, value);
            }
        }
    }
    builder.body(Body::from(refusal.body.clone())).unwrap()
}
