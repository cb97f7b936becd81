// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Non-stream response rewriter. Mirrors the request scanners on the
// response shape recorded at request time. A deny hit is resolved by the
// configured policy: block (synthetic refusal replaces the body) or replace
// (codepoint-preserving in-place masking). Clean chat-shaped responses get
// the mask rules applied (PII the model emitted, codepoint-preserving);
// clean raw-shaped responses get the mask map restored.

use serde_json::Value;

use crate::config::DenyStrategy;
use crate::context::FilterContext;
use crate::mask;
use crate::matcher;

/// Outcome of a response scanner.
#[derive(Debug, PartialEq)]
pub enum ResponseOutcome {
    /// The body is not this scanner's shape; try the next one.
    NotApplicable,
    /// Scanned clean, nothing changed.
    Pass,
    /// Body rewritten (replace policy or mask restoration).
    Replace(String),
    /// Block policy fired; the caller synthesizes the refusal.
    Deny,
}

/// Chat-completion-shaped response scanner.
///
/// Requires `choices.0.message` to be an object. Scans
/// `choices[*].message.content` and `.reasoning`.
pub fn process_openai_response(ctx: &mut FilterContext, body: &[u8]) -> ResponseOutcome {
    let Ok(mut root) = serde_json::from_slice::<Value>(body) else {
        return ResponseOutcome::NotApplicable;
    };
    if !root
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .map(Value::is_object)
        .unwrap_or(false)
    {
        return ResponseOutcome::NotApplicable;
    }

    let config = ctx.config.clone();
    let fields = |choice: &Value| -> (String, String) {
        let message = &choice["message"];
        (
            message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    };

    let choices = root
        .get("choices")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let denied = choices.iter().any(|choice| {
        let (content, reasoning) = fields(choice);
        matcher::message_denied(&content, &config) || matcher::message_denied(&reasoning, &config)
    });

    if denied && config.response_deny_plot.strategy == DenyStrategy::Block {
        return ResponseOutcome::Deny;
    }

    // Replace policy on a hit, mask-rule application otherwise: both walk
    // the same fields and only re-serialize when something changed.
    let mut modified = false;
    if let Some(choices) = root.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices.iter_mut() {
            let (content, reasoning) = fields(choice);
            if !content.is_empty() {
                let new_content = if denied {
                    mask::mask_deny_words(&content, &config, &config.response_deny_plot.value)
                } else {
                    mask::apply_rules_preserving(
                        &content,
                        &config.replace_roles,
                        &mut ctx.mask_map,
                    )
                };
                if new_content != content {
                    choice["message"]["content"] = Value::String(new_content);
                    modified = true;
                }
            }
            if !reasoning.is_empty() {
                let new_reasoning = if denied {
                    mask::mask_deny_words(&reasoning, &config, &config.response_deny_plot.value)
                } else {
                    mask::apply_rules_preserving(
                        &reasoning,
                        &config.replace_roles,
                        &mut ctx.mask_map,
                    )
                };
                if new_reasoning != reasoning {
                    choice["message"]["reasoning"] = Value::String(new_reasoning);
                    modified = true;
                }
            }
        }
    }

    if modified {
        ResponseOutcome::Replace(root.to_string())
    } else {
        ResponseOutcome::Pass
    }
}

/// Raw response scanner: the whole body as one opaque string.
pub fn process_raw_response(ctx: &mut FilterContext, body: &[u8]) -> ResponseOutcome {
    let text = String::from_utf8_lossy(body);
    let config = ctx.config.clone();

    if matcher::message_denied(&text, &config) {
        return match config.response_deny_plot.strategy {
            DenyStrategy::Block => ResponseOutcome::Deny,
            DenyStrategy::Replace => ResponseOutcome::Replace(mask::mask_deny_words(
                &text,
                &config,
                &config.response_deny_plot.value,
            )),
        };
    }

    let restored = mask::restore(&text, &ctx.mask_map);
    if restored != text {
        ResponseOutcome::Replace(restored)
    } else {
        ResponseOutcome::Pass
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompiledPattern, DenyPlot, FilterConfig, MaskKind, MaskRule};
    use std::sync::Arc;

    fn ctx_with(config: FilterConfig) -> FilterContext {
        FilterContext::new(Arc::new(config))
    }

    fn deny_config(words: &[&str]) -> FilterConfig {
        FilterConfig {
            deny_words: words.iter().map(|s| s.to_string()).collect(),
            ..FilterConfig::default()
        }
    }

    fn completion_body(content: &str) -> Vec<u8> {
        format!(
            r#"{{"id":"x","object":"chat.completion","choices":[{{"index":0,"message":{{"role":"assistant","content":{}}}}}]}}"#,
            serde_json::to_string(content).unwrap()
        )
        .into_bytes()
    }

    // ---------------------------------------------------------------
    // Block policy
    // ---------------------------------------------------------------

    #[test]
    fn openai_response_hit_with_block_policy_denies() {
        let mut ctx = ctx_with(deny_config(&["敏感词1"]));
        let outcome = process_openai_response(&mut ctx, &completion_body("回答含 敏感词1"));
        assert_eq!(outcome, ResponseOutcome::Deny);
    }

    #[test]
    fn openai_response_clean_passes() {
        let mut ctx = ctx_with(deny_config(&["敏感词1"]));
        let outcome = process_openai_response(&mut ctx, &completion_body("clean answer"));
        assert_eq!(outcome, ResponseOutcome::Pass);
    }

    #[test]
    fn non_completion_shape_is_not_applicable() {
        let mut ctx = ctx_with(deny_config(&["敏感词1"]));
        let outcome = process_openai_response(&mut ctx, (r#"{"result":"敏感词1"}"#).as_bytes());
        assert_eq!(outcome, ResponseOutcome::NotApplicable);
    }

    // ---------------------------------------------------------------
    // Replace policy (codepoint-preserving)
    // ---------------------------------------------------------------

    fn replace_config(words: &[&str], value: &str) -> FilterConfig {
        FilterConfig {
            response_deny_plot: DenyPlot {
                strategy: DenyStrategy::Replace,
                value: value.to_string(),
            },
            ..deny_config(words)
        }
    }

    #[test]
    fn replace_policy_masks_in_place() {
        let mut ctx = ctx_with(replace_config(&["敏感词1"], "*"));
        let outcome = process_openai_response(&mut ctx, &completion_body("前 敏感词1 后"));
        let ResponseOutcome::Replace(body) = outcome else {
            panic!("expected Replace, got {outcome:?}");
        };
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        let content = v["choices"][0]["message"]["content"].as_str().unwrap();
        assert_eq!(content, "前 **** 后");
        assert_eq!(content.chars().count(), "前 敏感词1 后".chars().count());
    }

    #[test]
    fn replace_policy_scans_reasoning_field() {
        let mut ctx = ctx_with(replace_config(&["bad"], "#"));
        let body = br#"{"choices":[{"message":{"content":"fine","reasoning":"a bad idea"}}]}"#;
        let ResponseOutcome::Replace(out) = process_openai_response(&mut ctx, body) else {
            panic!("expected Replace");
        };
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["choices"][0]["message"]["reasoning"], "a ### idea");
        assert_eq!(v["choices"][0]["message"]["content"], "fine");
    }

    // ---------------------------------------------------------------
    // Mask rules on clean responses / restoration on raw bodies
    // ---------------------------------------------------------------

    #[test]
    fn clean_response_masks_mobile_preserving_length() {
        let config = FilterConfig {
            replace_roles: vec![MaskRule {
                kind: MaskKind::Replace,
                restore: false,
                value: "*".to_string(),
                pattern: CompiledPattern::compile("%{MOBILE}").unwrap(),
            }],
            ..FilterConfig::default()
        };
        let mut ctx = ctx_with(config);
        let ResponseOutcome::Replace(body) =
            process_openai_response(&mut ctx, &completion_body("详情请联系13800138000，谢谢"))
        else {
            panic!("expected Replace");
        };
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        let content = v["choices"][0]["message"]["content"].as_str().unwrap();
        assert_eq!(content, "详情请联系***********，谢谢");
        assert_eq!(content.matches('*').count(), 11);
    }

    #[test]
    fn raw_response_restores_mask_map() {
        let mut ctx = ctx_with(FilterConfig::default());
        ctx.mask_map.insert("MASKED".to_string(), "orig".to_string());
        let outcome = process_raw_response(&mut ctx, b"value: MASKED");
        assert_eq!(outcome, ResponseOutcome::Replace("value: orig".to_string()));
    }

    #[test]
    fn raw_response_hit_with_block_policy_denies() {
        let mut ctx = ctx_with(deny_config(&["secret"]));
        assert_eq!(
            process_raw_response(&mut ctx, b"a secret leaked"),
            ResponseOutcome::Deny
        );
    }

    #[test]
    fn raw_response_hit_with_replace_policy_masks() {
        let mut ctx = ctx_with(replace_config(&["secret"], "*"));
        assert_eq!(
            process_raw_response(&mut ctx, b"a secret leaked"),
            ResponseOutcome::Replace("a ****** leaked".to_string())
        );
    }

    // Round trip: a token recorded during request masking comes back as
    // the original literal on a raw-shaped response.
    #[test]
    fn raw_response_round_trips_request_masking() {
        let config = FilterConfig {
            replace_roles: vec![MaskRule {
                kind: MaskKind::Hash,
                restore: true,
                value: String::new(),
                pattern: CompiledPattern::compile(r"\d{11}").unwrap(),
            }],
            ..FilterConfig::default()
        };
        let mut ctx = ctx_with(config);
        let rules = ctx.config.replace_roles.clone();
        let masked = mask::apply_rules("call 13900139000", &rules, &mut ctx.mask_map);
        assert!(!masked.contains("13900139000"));

        let echoed = format!("you said: {}", masked.strip_prefix("call ").unwrap());
        let ResponseOutcome::Replace(body) = process_raw_response(&mut ctx, echoed.as_bytes())
        else {
            panic!("expected Replace");
        };
        assert_eq!(body, "you said: 13900139000");
    }
}
