// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Single-shot consensus timer.
//!
//! At most one deadline is outstanding. Arming replaces it, cancelling an idle
//! timer does nothing, and firing disarms it. The key carried by a firing is
//! the `(height, view)` that was current when the timer was armed; the engine
//! compares it with its own state and ignores stale firings.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{BlockIndex, ViewNumber};

/// Height and view a timer was armed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub block_index: BlockIndex,
    pub view_number: ViewNumber,
}

impl TimerKey {
    pub fn new(block_index: BlockIndex, view_number: ViewNumber) -> Self {
        Self {
            block_index,
            view_number,
        }
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "height={} view={}", self.block_index, self.view_number)
    }
}

/// Re-armable single-shot timer driven by the tokio clock.
#[derive(Debug, Default)]
pub struct ConsensusTimer {
    armed: Option<(TimerKey, Instant)>,
}

impl ConsensusTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `key` after `delay`, replacing any outstanding deadline.
    pub fn arm(&mut self, key: TimerKey, delay: Duration) {
        self.armed = Some((key, Instant::now() + delay));
    }

    /// Drop the outstanding deadline, if any.
    pub fn cancel(&mut self) {
        self.armed = None;
    }

    /// Key of the outstanding deadline.
    pub fn key(&self) -> Option<TimerKey> {
        self.armed.map(|(key, _)| key)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|(_, deadline)| deadline)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Wait for the outstanding deadline and disarm.
    ///
    /// Pending forever while idle. Cancel safe: dropping the future before it
    /// completes leaves the deadline armed.
    pub async fn fired(&mut self) -> TimerKey {
        match self.armed {
            Some((key, deadline)) => {
                tokio::time::sleep_until(deadline).await;
                self.armed = None;
                key
            }
            None => std::future::pending().await,
        }
    }
}
