// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Liveness components for consensus.
//!
//! A round that stalls is abandoned through a view change. These components
//! decide when: the schedule computes how long to wait in each view, and the
//! timer delivers a single tagged deadline to the service loop.
//!
//! ## Structure
//!
//! - **schedule**: block interval and exponential backoff per view
//! - **timer**: single-shot, re-armable timer keyed by height and view

pub mod schedule;
pub mod timer;

// Re-export commonly used types
pub use schedule::TimeoutSchedule;
pub use timer::{ConsensusTimer, TimerKey};
