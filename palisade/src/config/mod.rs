// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Parses the filter's JSON config document, applies defaults, expands
// symbolic tokens in mask-rule patterns, compiles regexes (skipping broken
// rules), and snapshots the process-wide system deny list.

mod error;
mod loader;
mod pattern;
pub(crate) mod raw;
mod reload;
mod source;
mod types;

pub use error::ConfigError;
pub use loader::{load_config, set_system_deny_words};
pub use pattern::{expand_tokens, CompiledPattern};
pub use reload::{ReloadingConfig, DEFAULT_REBUILD_AFTER};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{
    DenyPlot, DenyStrategy, FilterConfig, MaskKind, MaskRule, DEFAULT_DENY_MESSAGE,
    DEFAULT_DENY_RAW_MESSAGE, DEFAULT_STREAM_BUFFER,
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
