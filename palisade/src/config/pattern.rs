// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::{Regex, RegexBuilder};

use super::error::ConfigError;

/// Maximum compiled regex size (1 MB). Prevents pathological patterns
/// from consuming excessive memory at startup.
const MAX_REGEX_SIZE: usize = 1024 * 1024;

/// Symbolic tokens accepted in mask-rule patterns, expanded to plain regex
/// fragments before compilation. The combined e-mail form is listed first so
/// it wins over its two components.
const SYMBOLIC_TOKENS: &[(&str, &str)] = &[
    (
        "%{EMAILLOCALPART}@%{HOSTNAME:domain}",
        r"[a-zA-Z0-9._%+-]+@([a-zA-Z0-9.-]+)",
    ),
    ("%{MOBILE}", r"\d{8,11}"),
    ("%{IDCARD}", r"\d{17}[0-9xX]|\d{15}"),
    ("%{IP}", r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}"),
    ("%{EMAILLOCALPART}", r"[a-zA-Z0-9._%+-]+"),
    ("%{HOSTNAME:domain}", r"([a-zA-Z0-9.-]+)"),
];

/// Expand symbolic `%{...}` tokens in a mask-rule pattern.
///
/// Patterns without tokens pass through unchanged, so plain regex keeps
/// working.
pub fn expand_tokens(pattern: &str) -> String {
    let mut result = pattern.to_string();
    for (token, fragment) in SYMBOLIC_TOKENS {
        result = result.replace(token, fragment);
    }
    result
}

/// A pre-compiled regex pattern. Wraps `regex::Regex` with the original
/// pattern string preserved for debugging/display.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    /// Compile a pattern, expanding symbolic tokens first. Returns
    /// `ConfigError::InvalidRegex` on failure.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let expanded = expand_tokens(pattern);
        let regex = RegexBuilder::new(&expanded)
            .size_limit(MAX_REGEX_SIZE)
            .build()
            .map_err(|e| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source: e,
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Test whether the pattern matches the given text.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}
