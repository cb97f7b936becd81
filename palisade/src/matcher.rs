// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Multi-pattern sensitive-word matcher.
//
// Matching is byte-exact over UTF-8 -- no case folding, no width folding.
// The two deny lists (operator and system) are compiled into Aho-Corasick
// automatons cached process-wide, keyed by element-wise list equality, so
// the automaton survives config reloads that do not change the list.

use std::sync::{Arc, RwLock};

use aho_corasick::AhoCorasick;

use crate::config::FilterConfig;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single deny-word occurrence. Positions are byte offsets into the
/// scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordHit {
    pub word: String,
    pub start: usize,
    pub end: usize,
}

/// Which cached automaton a word list maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexicon {
    /// Operator-configured `deny_words`.
    Custom,
    /// Process-wide `system_deny_words`.
    System,
}

// ---------------------------------------------------------------------------
// Matcher cache
// ---------------------------------------------------------------------------

struct Slot {
    words: Vec<String>,
    automaton: Arc<AhoCorasick>,
}

/// Two-slot automaton cache. One instance lives for the process; tests may
/// construct their own to observe caching without global interference.
pub struct MatcherCache {
    custom: RwLock<Option<Slot>>,
    system: RwLock<Option<Slot>>,
}

static SHARED: MatcherCache = MatcherCache::new();

impl MatcherCache {
    pub const fn new() -> Self {
        Self {
            custom: RwLock::new(None),
            system: RwLock::new(None),
        }
    }

    /// The process-wide cache used by the scanning helpers.
    pub fn shared() -> &'static MatcherCache {
        &SHARED
    }

    fn slot(&self, lexicon: Lexicon) -> &RwLock<Option<Slot>> {
        match lexicon {
            Lexicon::Custom => &self.custom,
            Lexicon::System => &self.system,
        }
    }

    /// Fetch the automaton for `words`, rebuilding on a snapshot mismatch.
    ///
    /// Read-biased: the common path takes only the read lock. On a miss the
    /// automaton is built outside the critical section, then installed under
    /// the write lock with a double-check so a concurrent builder wins once.
    pub fn automaton(&self, lexicon: Lexicon, words: &[String]) -> Arc<AhoCorasick> {
        let lock = self.slot(lexicon);
        {
            let slot = lock.read().unwrap();
            if let Some(cached) = slot.as_ref() {
                if cached.words == words {
                    return cached.automaton.clone();
                }
            }
        }

        let built = Arc::new(AhoCorasick::new(words).expect("deny-word automaton"));

        let mut slot = lock.write().unwrap();
        if let Some(cached) = slot.as_ref() {
            if cached.words == words {
                return cached.automaton.clone();
            }
        }
        *slot = Some(Slot {
            words: words.to_vec(),
            automaton: built.clone(),
        });
        built
    }
}

// ---------------------------------------------------------------------------
// Low-level operations
// ---------------------------------------------------------------------------

/// Whether `text` contains any member of `words` as a contiguous byte
/// substring. Empty text or an empty word list never match.
pub fn contains(lexicon: Lexicon, words: &[String], text: &str) -> bool {
    if text.is_empty() || words.is_empty() {
        return false;
    }
    MatcherCache::shared()
        .automaton(lexicon, words)
        .is_match(text)
}

fn first_hit(lexicon: Lexicon, words: &[String], text: &str) -> Option<String> {
    if text.is_empty() || words.is_empty() {
        return None;
    }
    MatcherCache::shared()
        .automaton(lexicon, words)
        .find(text)
        .map(|m| words[m.pattern().as_usize()].clone())
}

/// Every occurrence of every word in `text`, byte positions. Overlapping
/// matches of distinct words are all reported; a word appearing k times
/// contributes k hits. Ordering is unspecified.
pub fn find_all(lexicon: Lexicon, words: &[String], text: &str) -> Vec<WordHit> {
    if text.is_empty() || words.is_empty() {
        return Vec::new();
    }
    MatcherCache::shared()
        .automaton(lexicon, words)
        .find_overlapping_iter(text)
        .map(|m| WordHit {
            word: words[m.pattern().as_usize()].clone(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Config-driven scanning
// ---------------------------------------------------------------------------

/// True when `text` contains a word from the operator list or, when
/// `system_deny` is enabled, the system list. The operator list is
/// consulted first.
pub fn message_denied(text: &str, config: &FilterConfig) -> bool {
    if let Some(word) = first_hit(Lexicon::Custom, &config.deny_words, text) {
        tracing::warn!(%word, "custom deny word matched");
        return true;
    }
    if config.system_deny {
        if let Some(word) = first_hit(Lexicon::System, &config.system_deny_words, text) {
            tracing::warn!(%word, "system deny word matched");
            return true;
        }
    }
    false
}

/// All deny-word occurrences in `text` across both enabled lists.
pub fn deny_hits(text: &str, config: &FilterConfig) -> Vec<WordHit> {
    let mut hits = find_all(Lexicon::Custom, &config.deny_words, text);
    if config.system_deny {
        hits.extend(find_all(Lexicon::System, &config.system_deny_words, text));
    }
    hits
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
