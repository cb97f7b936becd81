// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Raw JSON deserialization types (internal)
// These are separate from the public FilterConfig because:
// 1. serde needs Deserialize, but the public types contain Regex (not Deserialize)
// 2. Defaults and symbolic-token expansion happen between raw and public
// 3. Keeps the public API clean

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub deny_openai: Option<bool>,
    #[serde(default)]
    pub deny_raw: bool,
    #[serde(default)]
    pub system_deny: bool,
    #[serde(default)]
    pub deny_jsonpath: Vec<String>,
    #[serde(default)]
    pub deny_words: Vec<String>,
    pub deny_code: Option<u16>,
    pub deny_message: Option<String>,
    pub deny_raw_message: Option<String>,
    pub deny_content_type: Option<String>,
    #[serde(default)]
    pub replace_roles: Vec<RawMaskRule>,
    pub stream_buffer: Option<usize>,
    pub response_deny_plot: Option<RawDenyPlot>,
}

#[derive(Debug, Deserialize)]
pub struct RawMaskRule {
    pub regex: String,
    /// "replace" or "hash".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub restore: bool,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct RawDenyPlot {
    pub strategy: Option<String>,
    pub value: Option<String>,
}
