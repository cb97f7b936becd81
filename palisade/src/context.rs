// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Per-exchange filter state.
//
// One FilterContext is created at the first callback of an exchange and
// dropped when the exchange ends. It is never observed by another request
// concurrently, so nothing here needs synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::FilterConfig;
use crate::stream::StreamAccumulator;

/// Which scanner fired a deny, echoed back in the `x-ai-data-masking`
/// response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenySource {
    OpenAi,
    JsonPath,
    Raw,
}

impl DenySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenySource::OpenAi => "OpenAI",
            DenySource::JsonPath => "JSONPath",
            DenySource::Raw => "Raw",
        }
    }
}

/// The callback the exchange is currently in, echoed back in the
/// `deny_step` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RequestHeader,
    RequestBody,
    ResponseHeader,
    ResponseBody,
    StreamResponseBody,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::RequestHeader => "request_header",
            Step::RequestBody => "request_body",
            Step::ResponseHeader => "resp_header",
            Step::ResponseBody => "resp_body",
            Step::StreamResponseBody => "stream_resp_body",
        }
    }
}

/// Fields mirrored from a chat-completion-shaped request body, needed later
/// on the response path (refusal envelopes echo the model; `stream` selects
/// the refusal format).
#[derive(Debug, Clone, Default)]
pub struct OpenAiRequest {
    pub model: String,
    pub stream: bool,
}

pub struct FilterContext {
    pub config: Arc<FilterConfig>,
    pub openai_request: OpenAiRequest,
    /// Masked token -> original literal. Append-only for the exchange.
    pub mask_map: HashMap<String, String>,
    pub request_deny_source: Option<DenySource>,
    pub response_deny_source: Option<DenySource>,
    pub step: Step,
    pub is_request_deny: bool,
    pub is_response_deny: bool,
    pub is_modified: bool,
    /// Set at the response-header callback; selects buffered vs streaming.
    pub resp_is_sse: bool,
    pub accumulator: StreamAccumulator,
}

impl FilterContext {
    pub fn new(config: Arc<FilterConfig>) -> Self {
        Self {
            openai_request: OpenAiRequest::default(),
            mask_map: HashMap::new(),
            request_deny_source: None,
            response_deny_source: None,
            step: Step::RequestHeader,
            is_request_deny: false,
            is_response_deny: false,
            is_modified: false,
            resp_is_sse: false,
            accumulator: StreamAccumulator::new(),
            config,
        }
    }
}
