// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Timeout schedule for views.
//!
//! The primary of view 0 waits out what is left of the block interval since
//! the previous block arrived. Every other wait doubles per view:
//! `interval * 2^min(view + 1, max_exponent)`.

use std::time::Duration;

use crate::config::ConsensusConfig;
use crate::types::ViewNumber;

/// Computes how long a node waits before acting in a view.
#[derive(Clone, Debug)]
pub struct TimeoutSchedule {
    /// Target block interval in milliseconds
    interval_ms: u64,
    /// Maximum exponent (caps the backoff)
    max_exponent: u32,
}

impl TimeoutSchedule {
    /// Create a schedule.
    ///
    /// # Panics
    ///
    /// Panics if `interval << max_exponent` does not fit in a `u64`.
    pub fn new(interval: Duration, max_exponent: u32) -> Self {
        let interval_ms = interval.as_millis() as u64;
        assert!(
            interval_ms.leading_zeros() >= max_exponent,
            "interval << max_exponent overflows"
        );
        Self {
            interval_ms,
            max_exponent,
        }
    }

    /// Schedule for a validated config.
    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(config.block_interval(), config.max_backoff_exponent)
    }

    /// Target block interval.
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Delay before the primary proposes.
    ///
    /// `since_last_block` is the time elapsed since the previous block was
    /// received; with no previous block the primary proposes at once.
    pub fn primary_delay(&self, since_last_block: Option<Duration>) -> Duration {
        match since_last_block {
            Some(elapsed) => self.block_interval().saturating_sub(elapsed),
            None => Duration::ZERO,
        }
    }

    /// Backoff for `view`.
    pub fn backoff(&self, view: ViewNumber) -> Duration {
        let exponent = (u32::from(view) + 1).min(self.max_exponent);
        Duration::from_millis(self.interval_ms << exponent)
    }
}
