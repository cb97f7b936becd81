// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

use super::pattern::CompiledPattern;

/// Default refusal text, returned verbatim inside every refusal envelope.
pub const DEFAULT_DENY_MESSAGE: &str = "提问或回答中包含敏感词，已被屏蔽";

/// Default body for raw-shaped refusals.
pub const DEFAULT_DENY_RAW_MESSAGE: &str = r#"{"errmsg":"提问或回答中包含敏感词，已被屏蔽"}"#;

/// Default sliding-window size for the stream accumulator, in bytes.
pub const DEFAULT_STREAM_BUFFER: usize = 1024 * 1024;

/// Per-route filter configuration, immutable for the lifetime of an exchange.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Scan chat-completion-shaped request/response bodies.
    pub deny_openai: bool,
    /// Scan the whole body as one opaque string.
    pub deny_raw: bool,
    /// Also consult the process-wide system deny list.
    pub system_deny: bool,
    /// Paths scanned against the request body (narrow grammar, see `jsonpath`).
    pub deny_jsonpath: Vec<String>,
    /// Operator deny list. Order preserved; hits are reported by list index.
    pub deny_words: Vec<String>,
    /// Snapshot of the process-wide system deny list at build time.
    pub system_deny_words: Vec<String>,
    /// Mask rules, applied in config order.
    pub replace_roles: Vec<MaskRule>,
    /// HTTP status of a synthesized refusal.
    pub deny_code: u16,
    pub deny_message: String,
    /// Accepted for config-surface compatibility; refusals for raw-shaped
    /// exchanges use the `{code,message,data}` envelope instead.
    pub deny_raw_message: String,
    pub deny_content_type: String,
    /// Sliding-window size in bytes for the stream accumulator.
    pub stream_buffer: usize,
    /// Response-side deny policy.
    pub response_deny_plot: DenyPlot,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            deny_openai: true,
            deny_raw: false,
            system_deny: false,
            deny_jsonpath: Vec::new(),
            deny_words: Vec::new(),
            system_deny_words: Vec::new(),
            replace_roles: Vec::new(),
            deny_code: 200,
            deny_message: DEFAULT_DENY_MESSAGE.to_string(),
            deny_raw_message: DEFAULT_DENY_RAW_MESSAGE.to_string(),
            deny_content_type: "application/json".to_string(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            response_deny_plot: DenyPlot::default(),
        }
    }
}

/// A single masking rule.
#[derive(Debug, Clone)]
pub struct MaskRule {
    pub kind: MaskKind,
    /// Record the mask -> original mapping for response-side restoration.
    pub restore: bool,
    /// Replacement template (`$1` etc. expand against the rule's regex).
    pub value: String,
    pub pattern: CompiledPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Regex substitution with `value`.
    Replace,
    /// Hex-encoded SHA-256 of the matched text.
    Hash,
}

/// Response-side deny policy.
#[derive(Debug, Clone)]
pub struct DenyPlot {
    pub strategy: DenyStrategy,
    /// Replacement unit for `Replace` (repeated and truncated to the
    /// masked word's codepoint length). Empty falls back to `*`.
    pub value: String,
}

impl Default for DenyPlot {
    fn default() -> Self {
        Self {
            strategy: DenyStrategy::Block,
            value: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyStrategy {
    /// Replace the whole response with a refusal.
    Block,
    /// Mask each hit in place, preserving codepoint counts.
    Replace,
}

impl DenyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyStrategy::Block => "block",
            DenyStrategy::Replace => "replace",
        }
    }
}
