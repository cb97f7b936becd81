// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Denier: protocol-shaped refusal synthesis.
//
// A sensitive hit is a business decision, not an error: the exchange is
// answered with a synthetic response that is format-compatible with what
// the client asked for -- a chat-completion JSON, an SSE script, or a raw
// envelope -- carrying the configured deny code and message.

use chrono::Utc;
use uuid::Uuid;

use crate::config::{DenyStrategy, FilterConfig};
use crate::context::{DenySource, FilterContext, Step};
use crate::openai::{
    ChatMessage, CompletionChoice, CompletionResponse, EnvelopeResponse,
    StreamCompletionResponse, StreamChoice, Usage,
};

// ---------------------------------------------------------------------------
// Refusal
// ---------------------------------------------------------------------------

/// A fully assembled refusal: status, body, and the diagnostic headers the
/// host applies to the synthesized response.
#[derive(Debug, Clone, PartialEq)]
pub struct Refusal {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub source: DenySource,
    pub step: Step,
    pub plot: DenyStrategy,
}

impl Refusal {
    /// Response headers for this refusal. `content-length` is recomputed
    /// from the synthesized body.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), self.content_type.clone()),
            ("content-length".to_string(), self.body.len().to_string()),
            (
                "x-ai-data-masking".to_string(),
                self.source.as_str().to_string(),
            ),
            ("deny_step".to_string(), self.step.as_str().to_string()),
            ("deny_plot".to_string(), self.plot.as_str().to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Envelope builders
// ---------------------------------------------------------------------------

/// Non-stream chat-completion refusal body.
pub fn completion_refusal(model: &str, message: &str) -> String {
    let response = CompletionResponse {
        id: Uuid::new_v4().to_string(),
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: message.to_string(),
            },
            finish_reason: None,
        }],
        usage: Some(Usage::zero()),
    };
    serde_json::to_string(&response).expect("refusal serialization")
}

/// Stream refusal script: one chat.completion.chunk event carrying the deny
/// message, then the terminator.
pub fn stream_refusal_script(model: &str, message: &str) -> String {
    let chunk = StreamCompletionResponse {
        id: Uuid::new_v4().to_string(),
        object: "chat.completion.chunk".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![StreamChoice {
            index: 0,
            delta: ChatMessage {
                role: "assistant".to_string(),
                content: message.to_string(),
            },
            finish_reason: Some("stop".to_string()),
        }],
    };
    let json = serde_json::to_string(&chunk).expect("refusal serialization");
    format!("data: {json}\n\ndata: [DONE]\n\n")
}

/// `{code, message, data: {}}` envelope for JSONPath-shaped refusals.
pub fn envelope_refusal(code: u16, message: &str) -> String {
    let envelope = EnvelopeResponse {
        code,
        message: message.to_string(),
        data: serde_json::Map::new(),
    };
    serde_json::to_string(&envelope).expect("refusal serialization")
}

// ---------------------------------------------------------------------------
// Context-driven assembly
// ---------------------------------------------------------------------------

/// Build the refusal for a request-phase deny by the given scanner.
pub fn request_refusal(ctx: &FilterContext, source: DenySource) -> Refusal {
    let config = &ctx.config;
    let (content_type, body) = match source {
        DenySource::OpenAi => {
            if ctx.openai_request.stream {
                (
                    "text/event-stream; charset=utf-8".to_string(),
                    stream_refusal_script(&ctx.openai_request.model, &config.deny_message),
                )
            } else {
                (
                    config.deny_content_type.clone(),
                    completion_refusal(&ctx.openai_request.model, &config.deny_message),
                )
            }
        }
        DenySource::JsonPath | DenySource::Raw => (
            config.deny_content_type.clone(),
            envelope_refusal(config.deny_code, &config.deny_message),
        ),
    };

    Refusal {
        status: config.deny_code,
        content_type,
        body: body.into_bytes(),
        source,
        step: ctx.step,
        plot: config.response_deny_plot.strategy,
    }
}

/// Build the refusal for a response-phase deny (block policy).
pub fn response_refusal(ctx: &FilterContext, source: DenySource) -> Refusal {
    let config = &ctx.config;
    let body = match source {
        DenySource::OpenAi => completion_refusal(&ctx.openai_request.model, &config.deny_message),
        DenySource::JsonPath | DenySource::Raw => {
            envelope_refusal(config.deny_code, &config.deny_message)
        }
    };

    Refusal {
        status: config.deny_code,
        content_type: config.deny_content_type.clone(),
        body: body.into_bytes(),
        source,
        step: ctx.step,
        plot: config.response_deny_plot.strategy,
    }
}

/// The single SSE refusal event (without terminator) used by the stream
/// accumulator's block policy.
pub fn stream_deny_event(config: &FilterConfig, model: &str) -> String {
    let chunk = StreamCompletionResponse {
        id: Uuid::new_v4().to_string(),
        object: "chat.completion.chunk".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![StreamChoice {
            index: 0,
            delta: ChatMessage {
                role: "assistant".to_string(),
                content: config.deny_message.clone(),
            },
            finish_reason: None,
        }],
    };
    let json = serde_json::to_string(&chunk).expect("refusal serialization");
    format!("data: {json}\n\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
