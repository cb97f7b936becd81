// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

// Rebuild-after-N-requests config handle.
//
// The filter config is parsed once and then re-parsed from its source every
// N served requests so refreshed inputs (word lists pushed to the config
// file) take effect without a restart. A failed rebuild keeps the previous
// config and logs a warning -- the data path never degrades to unfiltered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::error::ConfigError;
use super::loader::load_config;
use super::source::ConfigSource;
use super::types::FilterConfig;

/// How many requests a built config serves before it is rebuilt.
pub const DEFAULT_REBUILD_AFTER: u64 = 1000;

pub struct ReloadingConfig {
    source: Box<dyn ConfigSource>,
    rebuild_after: u64,
    served: AtomicU64,
    current: RwLock<Arc<FilterConfig>>,
}

impl ReloadingConfig {
    /// Build the initial config from `source`. Fails if the source is
    /// unreadable or invalid -- later rebuilds are fail-safe instead.
    pub fn new(source: Box<dyn ConfigSource>) -> Result<Self, ConfigError> {
        Self::with_rebuild_after(source, DEFAULT_REBUILD_AFTER)
    }

    pub fn with_rebuild_after(
        source: Box<dyn ConfigSource>,
        rebuild_after: u64,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(load_config(source.as_ref())?);
        Ok(Self {
            source,
            rebuild_after,
            served: AtomicU64::new(0),
            current: RwLock::new(config),
        })
    }

    /// The config for the next exchange. Counts the request and rebuilds
    /// from the source once every `rebuild_after` requests.
    pub fn current(&self) -> Arc<FilterConfig> {
        let served = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        if self.rebuild_after > 0 && served % self.rebuild_after == 0 {
            match load_config(self.source.as_ref()) {
                Ok(fresh) => {
                    *self.current.write().unwrap() = Arc::new(fresh);
                    tracing::info!(served, "filter config rebuilt");
                }
                Err(e) => {
                    tracing::warn!("config rebuild failed (keeping previous): {e}");
                }
            }
        }
        self.current.read().unwrap().clone()
    }
}
