// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Request rewriter: three body scanners run in a fixed order by the filter
// dispatcher. Each returns the rewritten body when masking changed it, plus
// whether a deny hit short-circuits the exchange. A scanner whose shape does
// not match its input silently no-ops so the next one gets its turn.

use serde_json::Value;

use crate::context::FilterContext;
use crate::jsonpath;
use crate::mask;
use crate::matcher;

/// Outcome of one request scanner: replacement body when modified, deny flag.
pub type ScanResult = (Option<String>, bool);

/// Chat-completion-shaped scanner.
///
/// Applies when the body parses as JSON and `messages.0.content` exists.
/// Records `model` and `stream` on the context for the response path.
/// Denies on the first message whose `content` or `reasoning_content` hits
/// a deny list; otherwise masks both fields in place.
pub fn process_openai_request(ctx: &mut FilterContext, body: &[u8]) -> ScanResult {
    let Ok(mut root) = serde_json::from_slice::<Value>(body) else {
        return (None, false);
    };
    if root
        .get("messages")
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("content"))
        .is_none()
    {
        return (None, false);
    }

    ctx.openai_request.stream = root.get("stream").and_then(Value::as_bool).unwrap_or(false);
    ctx.openai_request.model = root
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let config = ctx.config.clone();
    let mut modified = false;

    let Some(messages) = root.get_mut("messages").and_then(Value::as_array_mut) else {
        return (None, false);
    };
    for message in messages.iter_mut() {
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let reasoning = message
            .get("reasoning_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if matcher::message_denied(&content, &config)
            || matcher::message_denied(&reasoning, &config)
        {
            return (None, true);
        }

        let new_content = mask::apply_rules(&content, &config.replace_roles, &mut ctx.mask_map);
        if new_content != content {
            message["content"] = Value::String(new_content);
            modified = true;
        }
        let new_reasoning = mask::apply_rules(&reasoning, &config.replace_roles, &mut ctx.mask_map);
        if new_reasoning != reasoning {
            message["reasoning_content"] = Value::String(new_reasoning);
            modified = true;
        }
    }

    (modified.then(|| root.to_string()), false)
}

/// JSONPath scanner.
///
/// Resolves every configured path against the body and scans each selected
/// string. Masked values are written back by literal JSON-string
/// substitution: the old and new values are JSON-encoded and swapped in the
/// body text. Sufficient because the matched value originated from this
/// exact body.
pub fn process_jsonpath_request(ctx: &mut FilterContext, body: &[u8]) -> ScanResult {
    let body_str = String::from_utf8_lossy(body);
    let Ok(root) = serde_json::from_str::<Value>(&body_str) else {
        return (None, false);
    };

    let config = ctx.config.clone();
    let mut text = body_str.into_owned();
    let mut modified = false;

    for path in &config.deny_jsonpath {
        for value in jsonpath::strings_at(&root, path) {
            if matcher::message_denied(value, &config) {
                return (None, true);
            }
            let new_value = mask::apply_rules(value, &config.replace_roles, &mut ctx.mask_map);
            if new_value != value {
                let old_json =
                    serde_json::to_string(value).expect("string serialization");
                let new_json =
                    serde_json::to_string(&new_value).expect("string serialization");
                text = text.replace(&old_json, &new_json);
                modified = true;
            }
        }
    }

    (modified.then_some(text), false)
}

/// Raw scanner: the whole body as one opaque string.
pub fn process_raw_request(ctx: &mut FilterContext, body: &[u8]) -> ScanResult {
    let text = String::from_utf8_lossy(body);
    let config = ctx.config.clone();

    if matcher::message_denied(&text, &config) {
        return (None, true);
    }

    let new_body = mask::apply_rules(&text, &config.replace_roles, &mut ctx.mask_map);
    if new_body != text {
        (Some(new_body), false)
    } else {
        (None, false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
