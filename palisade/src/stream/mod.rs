// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// SSE sliding-window accumulation
//
// Responsibilities:
// - Normalize SSE framing and split chunks into events
// - Accumulate content/reasoning deltas into bounded sliding buffers
// - Detect deny words spanning arbitrary event boundaries
// - Flush on terminator, window pressure, or an early single-chunk hit
// - Synthesize block/replace output; swallow everything after a deny

mod accumulator;
mod sse;

pub use accumulator::{ChunkRecord, StreamAccumulator};

#[cfg(test)]
mod tests;
