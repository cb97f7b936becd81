// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Masker / Restorer.
//
// Mask rules rewrite PII-like substrings before they reach the upstream
// model. Rules flagged `restore` record a reversible mapping in the
// per-exchange mask map so the model's answer can be restored on the way
// back. Deny-word substitution (the response-side `replace` policy) is
// codepoint-length-preserving: detection positions are bytes, replacement
// arithmetic is chars.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::{FilterConfig, MaskKind, MaskRule};
use crate::matcher::{self, WordHit};

// ---------------------------------------------------------------------------
// Rule application
// ---------------------------------------------------------------------------

/// Apply every mask rule to `text` in config order, recording reversible
/// mappings into `mask_map` for rules with `restore` set. Request-path
/// semantics: `replace` substitutes the rule's value verbatim.
pub fn apply_rules(
    text: &str,
    rules: &[MaskRule],
    mask_map: &mut HashMap<String, String>,
) -> String {
    apply(text, rules, mask_map, false)
}

/// Response-path mask application. Non-restorable `replace` rules render
/// the value at the match's exact codepoint count so the rewritten body
/// keeps its shape; hash and restorable rules behave as on the request
/// path (their tokens must stay unique to round-trip).
pub fn apply_rules_preserving(
    text: &str,
    rules: &[MaskRule],
    mask_map: &mut HashMap<String, String>,
) -> String {
    apply(text, rules, mask_map, true)
}

fn apply(
    text: &str,
    rules: &[MaskRule],
    mask_map: &mut HashMap<String, String>,
    preserve_length: bool,
) -> String {
    if rules.is_empty() || text.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for rule in rules {
        if rule.kind == MaskKind::Replace && !rule.restore {
            if preserve_length {
                let matches: Vec<String> = rule
                    .pattern
                    .regex
                    .find_iter(&result)
                    .map(|m| m.as_str().to_string())
                    .collect();
                let mut seen: Vec<&str> = Vec::new();
                for original in &matches {
                    if seen.contains(&original.as_str()) {
                        continue;
                    }
                    seen.push(original);
                    let replacement =
                        length_preserving(&rule.value, original.chars().count());
                    result = result.replace(original, &replacement);
                }
            } else {
                // One-shot substitution, no bookkeeping.
                result = rule
                    .pattern
                    .regex
                    .replace_all(&result, rule.value.as_str())
                    .into_owned();
            }
            continue;
        }

        // Hash rules and restorable replacements work match-by-match so the
        // mask map can associate each masked token with its original.
        let matches: Vec<String> = rule
            .pattern
            .regex
            .find_iter(&result)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut seen: Vec<&str> = Vec::new();
        for original in &matches {
            if seen.contains(&original.as_str()) {
                continue;
            }
            seen.push(original);

            let to = match rule.kind {
                MaskKind::Hash => format!("{:x}", Sha256::digest(original.as_bytes())),
                MaskKind::Replace => rule
                    .pattern
                    .regex
                    .replace_all(original, rule.value.as_str())
                    .into_owned(),
            };
            if rule.restore && !to.is_empty() {
                mask_map.insert(to.clone(), original.clone());
            }
            result = result.replace(original, &to);
        }
    }

    result
}

/// Undo every recorded masking: each masked token in `text` is replaced by
/// its original literal. Tokens are designed not to overlap, so order is
/// not significant.
pub fn restore(text: &str, mask_map: &HashMap<String, String>) -> String {
    if mask_map.is_empty() || text.is_empty() {
        return text.to_string();
    }
    let mut result = text.to_string();
    for (masked, original) in mask_map {
        result = result.replace(masked, original);
    }
    result
}

// ---------------------------------------------------------------------------
// Codepoint-preserving deny-word substitution
// ---------------------------------------------------------------------------

/// Render `value` at exactly `char_count` codepoints: repeated when too
/// short, truncated when too long. An empty value falls back to `*`.
pub fn length_preserving(value: &str, char_count: usize) -> String {
    let unit = if value.is_empty() { "*" } else { value };
    unit.chars().cycle().take(char_count).collect()
}

/// Replace every deny-word occurrence in `text` with a codepoint-preserving
/// rendering of `value`.
pub fn mask_deny_words(text: &str, config: &FilterConfig, value: &str) -> String {
    if text.is_empty() {
        return text.to_string();
    }

    let hits = matcher::deny_hits(text, config);
    let mut result = text.to_string();
    let mut seen: Vec<&str> = Vec::new();
    for hit in &hits {
        if seen.contains(&hit.word.as_str()) {
            continue;
        }
        seen.push(&hit.word);
        let replacement = length_preserving(value, hit.word.chars().count());
        result = result.replace(&hit.word, &replacement);
    }
    result
}

/// Mask explicit hit ranges on `text` in one rendering pass.
///
/// Overlapping ranges are merged first, so a chunk tainted by two
/// overlapping words is masked once over the union. Used by the stream
/// accumulator, where substitution must not re-scan already-masked text.
pub fn mask_ranges(text: &str, hits: &[WordHit], value: &str) -> String {
    if hits.is_empty() {
        return text.to_string();
    }

    let mut ranges: Vec<(usize, usize)> = hits.iter().map(|h| (h.start, h.end)).collect();
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = vec![ranges[0]];
    for &(start, end) in &ranges[1..] {
        let last = merged.last_mut().unwrap();
        if start <= last.1 {
            last.1 = last.1.max(end);
        } else {
            merged.push((start, end));
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in merged {
        result.push_str(&text[cursor..start]);
        result.push_str(&length_preserving(value, text[start..end].chars().count()));
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
