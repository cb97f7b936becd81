// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

use super::StreamAccumulator;
use crate::config::{DenyPlot, DenyStrategy, FilterConfig};

fn config(words: &[&str], stream_buffer: usize) -> FilterConfig {
    FilterConfig {
        deny_words: words.iter().map(|s| s.to_string()).collect(),
        stream_buffer,
        ..FilterConfig::default()
    }
}

fn replace_config(words: &[&str], stream_buffer: usize, value: &str) -> FilterConfig {
    FilterConfig {
        response_deny_plot: DenyPlot {
            strategy: DenyStrategy::Replace,
            value: value.to_string(),
        },
        ..config(words, stream_buffer)
    }
}

/// One SSE event carrying a content delta, JSON-escaped properly.
fn content_event(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices":[{"delta":{"content": content}}]})
    )
}

fn reasoning_event(reasoning: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices":[{"delta":{"reasoning": reasoning}}]})
    )
}

const DONE: &str = "data: [DONE]\n\n";

fn feed(acc: &mut StreamAccumulator, cfg: &FilterConfig, chunk: &str) -> String {
    String::from_utf8(acc.process_chunk(chunk.as_bytes(), false, cfg, "m")).unwrap()
}

fn finish(acc: &mut StreamAccumulator, cfg: &FilterConfig) -> String {
    String::from_utf8(acc.process_chunk(b"", true, cfg, "m")).unwrap()
}

// -----------------------------------------------------------------------
// Scenario: hit within a single chunk (S3)
// -----------------------------------------------------------------------

#[test]
fn single_chunk_hit_emits_refusal_and_nothing_else() {
    let cfg = config(&["敏感词1", "敏感词2"], 1024);
    let mut acc = StreamAccumulator::new();

    // The clean first chunk is buffered, not forwarded.
    assert_eq!(feed(&mut acc, &cfg, &content_event("你好")), "");

    // The hit flushes immediately via the early probe.
    let out = feed(&mut acc, &cfg, &content_event("敏感词1"));
    assert!(acc.is_denied());
    assert!(out.ends_with(DONE));
    assert!(!out.contains("你好"));
    assert!(!out.contains("敏感词1"));

    let events: Vec<&str> = out.split("\n\n").filter(|e| !e.is_empty()).collect();
    assert_eq!(events.len(), 2);
    let json = events[0].strip_prefix("data: ").unwrap();
    let v: serde_json::Value = serde_json::from_str(json).unwrap();
    assert_eq!(v["object"], "chat.completion.chunk");
    assert_eq!(v["model"], "m");
    assert_eq!(
        v["choices"][0]["delta"]["content"],
        cfg.deny_message.as_str()
    );

    // The upstream terminator arrives afterwards and is swallowed.
    assert_eq!(feed(&mut acc, &cfg, DONE), "");
}

// -----------------------------------------------------------------------
// Scenario: hit split across chunks (S4)
// -----------------------------------------------------------------------

#[test]
fn cross_boundary_hit_is_detected() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    assert_eq!(feed(&mut acc, &cfg, &content_event("敏")), "");
    assert_eq!(feed(&mut acc, &cfg, &content_event("感词1")), "");
    assert_eq!(feed(&mut acc, &cfg, &content_event("后缀")), "");

    // Neither fragment alone contains the word; the flush sees it whole.
    let out = finish(&mut acc, &cfg);
    assert!(acc.is_denied());
    assert!(!out.contains("敏感词1"));
    assert!(!out.contains("后缀"));
    assert!(out.contains(cfg.deny_message.as_str()));
    assert!(out.ends_with(DONE));
}

#[test]
fn cross_boundary_hit_flushes_on_done_terminator() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    assert_eq!(feed(&mut acc, &cfg, &content_event("敏")), "");
    let out = feed(&mut acc, &cfg, &format!("{}{}", content_event("感词1"), DONE));
    assert!(acc.is_denied());
    assert!(out.contains(cfg.deny_message.as_str()));
    assert!(out.ends_with(DONE));
}

// -----------------------------------------------------------------------
// Scenario: clean stream passes through byte-exact (S5)
// -----------------------------------------------------------------------

#[test]
fn clean_stream_is_byte_exact_passthrough() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    let e1 = content_event("hello ");
    let e2 = content_event("world");
    let e3 = content_event("!");

    let mut out = String::new();
    out.push_str(&feed(&mut acc, &cfg, &e1));
    out.push_str(&feed(&mut acc, &cfg, &e2));
    out.push_str(&feed(&mut acc, &cfg, &e3));
    out.push_str(&feed(&mut acc, &cfg, DONE));

    assert!(!acc.is_denied());
    assert_eq!(out, format!("{e1}{e2}{e3}{DONE}"));
}

#[test]
fn clean_stream_flushes_on_empty_last_chunk() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    let e1 = content_event("partial answer");
    assert_eq!(feed(&mut acc, &cfg, &e1), "");
    assert_eq!(finish(&mut acc, &cfg), e1);
}

#[test]
fn events_with_non_delta_payloads_pass_through() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    // Role-only delta and a usage frame: nothing to accumulate, still
    // forwarded verbatim on flush.
    let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
    let usage = "data: {\"usage\":{\"total_tokens\":3}}\n\n";
    assert_eq!(feed(&mut acc, &cfg, role), "");
    assert_eq!(feed(&mut acc, &cfg, usage), "");
    assert_eq!(finish(&mut acc, &cfg), format!("{role}{usage}"));
}

// -----------------------------------------------------------------------
// Flush triggers
// -----------------------------------------------------------------------

#[test]
fn full_window_flushes_without_terminator() {
    // Tiny window: the first event alone crosses it.
    let cfg = config(&["敏感词1"], 16);
    let mut acc = StreamAccumulator::new();

    let e1 = content_event("a clean but long enough delta");
    let out = feed(&mut acc, &cfg, &e1);
    assert_eq!(out, e1);
    assert!(!acc.is_denied());
}

#[test]
fn reasoning_channel_is_scanned_too() {
    let cfg = config(&["密谋"], 1024);
    let mut acc = StreamAccumulator::new();

    let out = feed(&mut acc, &cfg, &reasoning_event("这是密谋内容"));
    assert!(acc.is_denied());
    assert!(out.contains(cfg.deny_message.as_str()));
    assert!(!out.contains("密谋"));
}

#[test]
fn word_straddling_content_and_reasoning_is_not_a_hit() {
    // The two buffers are independent; halves in different channels never
    // concatenate.
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    assert_eq!(feed(&mut acc, &cfg, &content_event("敏感")), "");
    assert_eq!(feed(&mut acc, &cfg, &reasoning_event("词1")), "");
    let out = finish(&mut acc, &cfg);
    assert!(!acc.is_denied());
    assert!(!out.is_empty());
}

// -----------------------------------------------------------------------
// Sliding window
// -----------------------------------------------------------------------

#[test]
fn window_slides_without_losing_recent_hits() {
    let cfg = config(&["badword"], 24);
    let mut acc = StreamAccumulator::new();

    // Push enough clean text to slide the window several times.
    for _ in 0..6 {
        let _ = feed(&mut acc, &cfg, &content_event("0123456789"));
    }
    assert!(!acc.is_denied());

    let out = feed(&mut acc, &cfg, &content_event("xbadwordx"));
    assert!(acc.is_denied());
    assert!(!out.contains("badword"));
}

#[test]
fn window_slide_is_utf8_safe() {
    // Multi-byte deltas force the cut onto char boundaries.
    let cfg = config(&["敏感词1"], 10);
    let mut acc = StreamAccumulator::new();

    for _ in 0..8 {
        let _ = feed(&mut acc, &cfg, &content_event("中文内容流"));
    }
    let _ = finish(&mut acc, &cfg);
    assert!(!acc.is_denied());
}

// -----------------------------------------------------------------------
// Terminal states
// -----------------------------------------------------------------------

#[test]
fn denied_stream_swallows_all_later_input() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    let _ = feed(&mut acc, &cfg, &content_event("敏感词1"));
    assert!(acc.is_denied());

    assert_eq!(feed(&mut acc, &cfg, &content_event("more")), "");
    assert_eq!(feed(&mut acc, &cfg, DONE), "");
    assert_eq!(finish(&mut acc, &cfg), "");
}

#[test]
fn closed_stream_swallows_bytes_after_done() {
    let cfg = config(&["敏感词1"], 1024);
    let mut acc = StreamAccumulator::new();

    let e1 = content_event("fine");
    let out = feed(&mut acc, &cfg, &format!("{e1}{DONE}"));
    assert_eq!(out, format!("{e1}{DONE}"));

    assert_eq!(feed(&mut acc, &cfg, &content_event("late")), "");
}

// -----------------------------------------------------------------------
// Replace policy
// -----------------------------------------------------------------------

#[test]
fn replace_policy_masks_hits_preserving_codepoints() {
    let cfg = replace_config(&["敏感词1"], 1024, "*");
    let mut acc = StreamAccumulator::new();

    assert_eq!(feed(&mut acc, &cfg, &content_event("你好")), "");
    let out = feed(&mut acc, &cfg, &content_event("敏感词1了"));
    assert!(acc.is_denied());
    assert!(!out.contains("敏感词1"));
    assert!(out.ends_with(DONE));

    let events: Vec<&str> = out.split("\n\n").filter(|e| !e.is_empty()).collect();
    assert_eq!(events.len(), 3);

    let delta = |event: &str| -> String {
        let json = event.strip_prefix("data: ").unwrap();
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        v["choices"][0]["delta"]["content"]
            .as_str()
            .unwrap()
            .to_string()
    };
    // The clean chunk keeps its text; the tainted one is masked at the
    // same codepoint length.
    assert_eq!(delta(events[0]), "你好");
    assert_eq!(delta(events[1]), "****了");
    assert_eq!(events[2], "data: [DONE]");
}

#[test]
fn replace_policy_masks_word_split_across_chunks() {
    let cfg = replace_config(&["secret"], 1024, "#");
    let mut acc = StreamAccumulator::new();

    assert_eq!(feed(&mut acc, &cfg, &content_event("a sec")), "");
    assert_eq!(feed(&mut acc, &cfg, &content_event("ret b")), "");
    let out = finish(&mut acc, &cfg);

    assert!(acc.is_denied());
    assert!(!out.contains("secret"));
    // Both fragments come back masked over the spanning range.
    assert!(out.contains("a ###"));
    assert!(out.contains("### b"));
    assert!(out.ends_with(DONE));
}

#[test]
fn replace_policy_passes_buffered_done_through_once() {
    let cfg = replace_config(&["bad"], 1024, "*");
    let mut acc = StreamAccumulator::new();

    let out = feed(&mut acc, &cfg, &format!("{}{}", content_event("bad news"), DONE));
    assert!(acc.is_denied());
    assert_eq!(out.matches("data: [DONE]").count(), 1);
    assert!(out.contains("*** news"));
}
