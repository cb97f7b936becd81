// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// SSE framing helpers. The upstream guarantees event delimitation by a
// blank line but nothing about chunk alignment or line endings, so every
// chunk is normalized before the accumulator looks at it.

/// Normalize a chunk's line endings: CRLF and lone CR become LF.
pub fn unify_chunk(chunk: &[u8]) -> String {
    let text = String::from_utf8_lossy(chunk);
    if !text.contains('\r') {
        return text.into_owned();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split normalized text into candidate SSE events.
pub fn split_events(text: &str) -> impl Iterator<Item = &str> {
    text.trim().split("\n\n").filter(|e| !e.is_empty())
}

/// Whether an event is the stream terminator.
pub fn is_done_event(event: &str) -> bool {
    event.contains("data: [DONE]")
}

/// The `data:` payloads of one event, prefix stripped and trimmed.
pub fn data_payloads(event: &str) -> impl Iterator<Item = &str> {
    event
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|payload| !payload.is_empty())
}
