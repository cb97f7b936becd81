// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::RwLock;

use super::error::ConfigError;
use super::pattern::CompiledPattern;
use super::raw::RawConfig;
use super::source::ConfigSource;
use super::types::*;

/// Process-wide system deny list. Shared by every filter instance; each
/// config build takes a snapshot so an exchange never observes a mid-flight
/// change.
static SYSTEM_DENY_WORDS: RwLock<Vec<String>> = RwLock::new(Vec::new());

/// Replace the process-wide system deny list.
pub fn set_system_deny_words(words: Vec<String>) {
    *SYSTEM_DENY_WORDS.write().unwrap() = words;
}

fn system_deny_words_snapshot() -> Vec<String> {
    SYSTEM_DENY_WORDS.read().unwrap().clone()
}

/// Load and validate a filter config from the given source.
///
/// Steps:
/// 1. Read raw JSON from source
/// 2. Parse into raw deserialization types
/// 3. Apply defaults, trim/dedupe word lists
/// 4. Expand symbolic tokens and compile mask-rule regexes
///    (rules that fail to compile are logged and skipped)
/// 5. Build the typed FilterConfig
pub fn load_config(source: &dyn ConfigSource) -> Result<FilterConfig, ConfigError> {
    let raw_json = source.load()?;
    let raw: RawConfig = serde_json::from_str(&raw_json)?;

    let deny_jsonpath: Vec<String> = raw
        .deny_jsonpath
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();

    // Trim, drop empties, keep first occurrence. Order matters: hits are
    // reported by list index and the matcher cache is keyed element-wise.
    let mut deny_words: Vec<String> = Vec::with_capacity(raw.deny_words.len());
    for word in raw.deny_words {
        let word = word.trim();
        if !word.is_empty() && !deny_words.iter().any(|w| w == word) {
            deny_words.push(word.to_string());
        }
    }

    let mut replace_roles = Vec::with_capacity(raw.replace_roles.len());
    for rule in raw.replace_roles {
        let kind = match rule.kind.as_str() {
            "replace" => MaskKind::Replace,
            "hash" => MaskKind::Hash,
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown mask rule type \"{other}\", expected \"replace\" or \"hash\""
                )));
            }
        };
        match CompiledPattern::compile(&rule.regex) {
            Ok(pattern) => replace_roles.push(MaskRule {
                kind,
                restore: rule.restore,
                value: rule.value,
                pattern,
            }),
            Err(e) => {
                // A broken rule must not take the others down with it.
                tracing::warn!(regex = %rule.regex, "skipping mask rule: {e}");
            }
        }
    }

    let response_deny_plot = match raw.response_deny_plot {
        Some(plot) => {
            let strategy = match plot.strategy.as_deref() {
                Some("block") | None => DenyStrategy::Block,
                Some("replace") => DenyStrategy::Replace,
                Some(other) => {
                    return Err(ConfigError::Validation(format!(
                        "unknown response_deny_plot strategy \"{other}\", \
                         expected \"block\" or \"replace\""
                    )));
                }
            };
            let value = match plot.value {
                Some(v) if !v.is_empty() => v,
                _ => "*".to_string(),
            };
            DenyPlot { strategy, value }
        }
        None => DenyPlot::default(),
    };

    let stream_buffer = match raw.stream_buffer {
        Some(0) | None => DEFAULT_STREAM_BUFFER,
        Some(n) => n,
    };

    Ok(FilterConfig {
        deny_openai: raw.deny_openai.unwrap_or(true),
        deny_raw: raw.deny_raw,
        system_deny: raw.system_deny,
        deny_jsonpath,
        deny_words,
        system_deny_words: system_deny_words_snapshot(),
        replace_roles,
        deny_code: raw.deny_code.unwrap_or(200),
        deny_message: raw
            .deny_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_DENY_MESSAGE.to_string()),
        deny_raw_message: raw
            .deny_raw_message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_DENY_RAW_MESSAGE.to_string()),
        deny_content_type: raw
            .deny_content_type
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "application/json".to_string()),
        stream_buffer,
        response_deny_plot,
    })
}
