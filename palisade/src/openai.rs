// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Chat-completion wire envelopes.
//
// Only the synthesized refusal shapes live here; the rewriters navigate
// request/response bodies as `serde_json::Value` so unknown fields survive
// write-back untouched.

use serde::Serialize;

/// Non-stream chat completion (`object = "chat.completion"`).
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One SSE event of a streamed completion (`object = "chat.completion.chunk"`).
#[derive(Debug, Serialize)]
pub struct StreamCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Serialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Message/delta body shared by both shapes.
#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn zero() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        }
    }
}

/// Refusal envelope for JSONPath- and raw-shaped exchanges.
#[derive(Debug, Serialize)]
pub struct EnvelopeResponse {
    pub code: u16,
    pub message: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}
