// Stream accumulator: sliding-window sensitive-word detection over SSE
// chat-completion deltas.
//
// Deltas from `choices[*].delta.{content,reasoning}` accumulate into two
// bounded buffers so a deny word split across arbitrary event boundaries is
// still seen whole. The original event bytes are buffered alongside with
// (start, end) back-references into the buffers; on flush the records are
// either re-emitted verbatim (clean), rewritten with masked slices
// (replace policy), or discarded in favor of a refusal script (block
// policy). Once a deny fires, every later chunk is swallowed -- no partial
// model output crosses the trust boundary after the refusal.

use serde_json::Value;

use crate::config::{DenyStrategy, FilterConfig};
use crate::deny;
use crate::mask;
use crate::matcher::{self, WordHit};

use super::sse;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One buffered SSE event with back-references into the sliding buffers.
/// Positions are byte offsets, re-based on every slide and clamped to zero
/// when the event predates the surviving window.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub data: String,
    pub content_start: usize,
    pub content_end: usize,
    pub reasoning_start: usize,
    pub reasoning_end: usize,
    pub is_done: bool,
}

impl ChunkRecord {
    fn done(data: String) -> Self {
        Self {
            data,
            content_start: 0,
            content_end: 0,
            reasoning_start: 0,
            reasoning_end: 0,
            is_done: true,
        }
    }
}

/// Which sliding buffer a flush-time hit was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitSource {
    Content,
    Reasoning,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Streaming state of one exchange.
///
/// State machine: OPEN -> (denying flush) -> DENIED, or
/// OPEN -> ([DONE] flush without hit) -> CLOSED. Both terminal states
/// swallow all further input.
pub struct StreamAccumulator {
    content_buffer: String,
    reasoning_buffer: String,
    chunks: Vec<ChunkRecord>,
    chunks_bytes: usize,
    denied: bool,
    ended: bool,
    closed: bool,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            content_buffer: String::new(),
            reasoning_buffer: String::new(),
            chunks: Vec::new(),
            chunks_bytes: 0,
            denied: false,
            ended: false,
            closed: false,
        }
    }

    /// Whether a denying flush has happened. Terminal.
    pub fn is_denied(&self) -> bool {
        self.denied
    }

    /// Process one chunk from the host. Returns the bytes to emit
    /// downstream; empty means the input is buffered (or swallowed, once
    /// the stream is denied or closed).
    pub fn process_chunk(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        config: &FilterConfig,
        model: &str,
    ) -> Vec<u8> {
        if self.denied || self.closed {
            return Vec::new();
        }

        let buffer_size = config.stream_buffer;
        let text = sse::unify_chunk(chunk);

        for event in sse::split_events(&text) {
            if sse::is_done_event(event) {
                self.chunks.push(ChunkRecord::done(format!("{event}\n\n")));
                self.chunks_bytes += event.len() + 2;
                self.ended = true;
                break;
            }
            self.append_event(event, buffer_size);
        }

        if !(self.ended || is_last || self.chunks_bytes >= buffer_size)
            && !self.early_probe(config)
        {
            // Window not full, stream still open, nothing suspicious in the
            // newest slice: keep buffering.
            return Vec::new();
        }

        self.flush(config, model)
    }

    /// Parse one non-terminator event, append its deltas to the sliding
    /// buffers, and record the event with its buffer ranges.
    fn append_event(&mut self, event: &str, buffer_size: usize) {
        let mut content_start = self.content_buffer.len();
        let mut reasoning_start = self.reasoning_buffer.len();

        for payload in sse::data_payloads(event) {
            let Ok(root) = serde_json::from_str::<Value>(payload) else {
                continue;
            };
            let Some(choices) = root.get("choices").and_then(Value::as_array) else {
                continue;
            };
            for choice in choices {
                let Some(delta) = choice.get("delta") else {
                    continue;
                };
                if let Some(content) = delta.get("content").and_then(Value::as_str) {
                    if !content.is_empty() {
                        self.content_buffer.push_str(content);
                        if self.content_buffer.len() > buffer_size {
                            let cutoff = slide(&mut self.content_buffer, buffer_size);
                            for record in &mut self.chunks {
                                record.content_start = record.content_start.saturating_sub(cutoff);
                                record.content_end = record.content_end.saturating_sub(cutoff);
                            }
                            content_start = content_start.saturating_sub(cutoff);
                        }
                    }
                }
                if let Some(reasoning) = delta.get("reasoning").and_then(Value::as_str) {
                    if !reasoning.is_empty() {
                        self.reasoning_buffer.push_str(reasoning);
                        if self.reasoning_buffer.len() > buffer_size {
                            let cutoff = slide(&mut self.reasoning_buffer, buffer_size);
                            for record in &mut self.chunks {
                                record.reasoning_start =
                                    record.reasoning_start.saturating_sub(cutoff);
                                record.reasoning_end = record.reasoning_end.saturating_sub(cutoff);
                            }
                            reasoning_start = reasoning_start.saturating_sub(cutoff);
                        }
                    }
                }
            }
        }

        self.chunks.push(ChunkRecord {
            data: format!("{event}\n\n"),
            content_start,
            content_end: self.content_buffer.len(),
            reasoning_start,
            reasoning_end: self.reasoning_buffer.len(),
            is_done: false,
        });
        self.chunks_bytes += event.len() + 2;
    }

    /// Scan only the newest record's freshly appended slices so a
    /// single-chunk hit does not wait for the window to fill.
    fn early_probe(&self, config: &FilterConfig) -> bool {
        let Some(last) = self.chunks.last() else {
            return false;
        };
        if last.is_done {
            return false;
        }
        if last.content_end > last.content_start {
            let fresh = &self.content_buffer[last.content_start..last.content_end];
            if matcher::message_denied(fresh, config) {
                return true;
            }
        }
        if last.reasoning_end > last.reasoning_start {
            let fresh = &self.reasoning_buffer[last.reasoning_start..last.reasoning_end];
            if matcher::message_denied(fresh, config) {
                return true;
            }
        }
        false
    }

    fn flush(&mut self, config: &FilterConfig, model: &str) -> Vec<u8> {
        // Accounting guard: a record range pointing past its buffer means
        // the bookkeeping is broken. Fail toward DENIED, never toward
        // leaking unscanned output.
        let broken = self.chunks.iter().any(|r| {
            r.content_end > self.content_buffer.len()
                || r.reasoning_end > self.reasoning_buffer.len()
        });
        if broken {
            tracing::error!("stream accumulator range out of bounds, denying stream");
            self.denied = true;
            self.reset_chunks();
            let mut script = deny::stream_deny_event(config, model);
            script.push_str("data: [DONE]\n\n");
            return script.into_bytes();
        }

        let mut hits: Vec<(WordHit, HitSource)> = matcher::deny_hits(&self.content_buffer, config)
            .into_iter()
            .map(|h| (h, HitSource::Content))
            .collect();
        hits.extend(
            matcher::deny_hits(&self.reasoning_buffer, config)
                .into_iter()
                .map(|h| (h, HitSource::Reasoning)),
        );

        if hits.is_empty() {
            let mut out = String::new();
            for record in &self.chunks {
                out.push_str(&record.data);
            }
            if self.ended {
                self.closed = true;
            }
            self.reset_chunks();
            return out.into_bytes();
        }

        self.denied = true;
        let out = match config.response_deny_plot.strategy {
            DenyStrategy::Block => {
                let mut script = deny::stream_deny_event(config, model);
                script.push_str("data: [DONE]\n\n");
                script
            }
            DenyStrategy::Replace => self.emit_masked(config, &hits),
        };
        self.reset_chunks();
        out.into_bytes()
    }

    /// Replace policy: mask both buffers once over the recorded hit ranges,
    /// then re-emit every buffered record with its deltas rewritten to the
    /// codepoint-mapped slice of the masked text.
    fn emit_masked(&self, config: &FilterConfig, hits: &[(WordHit, HitSource)]) -> String {
        let value = &config.response_deny_plot.value;
        let content_hits: Vec<WordHit> = hits
            .iter()
            .filter(|(_, s)| *s == HitSource::Content)
            .map(|(h, _)| h.clone())
            .collect();
        let reasoning_hits: Vec<WordHit> = hits
            .iter()
            .filter(|(_, s)| *s == HitSource::Reasoning)
            .map(|(h, _)| h.clone())
            .collect();

        let masked_content = mask::mask_ranges(&self.content_buffer, &content_hits, value);
        let masked_reasoning = mask::mask_ranges(&self.reasoning_buffer, &reasoning_hits, value);

        let mut out = String::new();
        let mut saw_done = false;
        for record in &self.chunks {
            if record.is_done {
                out.push_str(&record.data);
                saw_done = true;
                continue;
            }
            let content_slice = masked_slice(
                &self.content_buffer,
                &masked_content,
                record.content_start,
                record.content_end,
            );
            let reasoning_slice = masked_slice(
                &self.reasoning_buffer,
                &masked_reasoning,
                record.reasoning_start,
                record.reasoning_end,
            );
            out.push_str(&rewrite_event(record, &content_slice, &reasoning_slice));
        }
        if !saw_done {
            // The upstream terminator has not arrived; the stream is done
            // from the client's point of view, so close it out now.
            out.push_str("data: [DONE]\n\n");
        }
        out
    }

    fn reset_chunks(&mut self) {
        self.chunks.clear();
        self.chunks_bytes = 0;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Drop the leading bytes that overflow `buffer_size`, rounding the cut up
/// to a character boundary. Returns the number of bytes removed.
fn slide(buffer: &mut String, buffer_size: usize) -> usize {
    let mut cutoff = buffer.len() - buffer_size;
    while !buffer.is_char_boundary(cutoff) {
        cutoff += 1;
    }
    buffer.drain(..cutoff);
    cutoff
}

/// Map a byte range on the original buffer to the corresponding codepoint
/// range on its masked counterpart. Replacements preserve codepoint counts
/// but not byte counts, so the two coordinate systems differ.
fn masked_slice(original: &str, masked: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    let start_cp = original[..start.min(original.len())].chars().count();
    let end_cp = original[..end.min(original.len())].chars().count();
    masked
        .chars()
        .skip(start_cp)
        .take(end_cp - start_cp)
        .collect()
}

/// Re-render a buffered event with its content/reasoning deltas replaced.
/// Lines that are not chat-completion data payloads pass through verbatim.
fn rewrite_event(record: &ChunkRecord, content: &str, reasoning: &str) -> String {
    let mut lines = Vec::new();
    for line in record.data.trim_end().lines() {
        let trimmed = line.trim();
        let rewritten = trimmed.strip_prefix("data:").and_then(|payload| {
            let mut root: Value = serde_json::from_str(payload.trim()).ok()?;
            let choices = root.get_mut("choices")?.as_array_mut()?;
            let mut touched = false;
            for choice in choices.iter_mut() {
                let Some(delta) = choice.get_mut("delta") else {
                    continue;
                };
                if delta.get("content").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
                    delta["content"] = Value::String(content.to_string());
                    touched = true;
                }
                if delta.get("reasoning").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
                    delta["reasoning"] = Value::String(reasoning.to_string());
                    touched = true;
                }
            }
            touched.then(|| format!("data: {root}"))
        });
        lines.push(rewritten.unwrap_or_else(|| line.to_string()));
    }
    format!("{}\n\n", lines.join("\n"))
}
