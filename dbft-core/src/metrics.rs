// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Consensus counters.
//!
//! The engine updates these as it works; the node reads a [`MetricsSnapshot`]
//! for logging or export.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to the engine's counters.
#[derive(Clone, Debug, Default)]
pub struct ConsensusMetrics {
    state: Arc<MetricsState>,
}

#[derive(Debug, Default)]
struct MetricsState {
    height: AtomicU64,
    view: AtomicU64,
    heights_started: AtomicU64,
    view_changes: AtomicU64,
    change_view_requests: AtomicU64,
    timeouts: AtomicU64,
    proposals_sent: AtomicU64,
    proposals_accepted: AtomicU64,
    responses_sent: AtomicU64,
    signatures_received: AtomicU64,
    blocks_relayed: AtomicU64,
    payloads_ignored: AtomicU64,
    transactions_rejected: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Height currently being agreed upon
    pub height: u64,
    /// Current view
    pub view: u64,
    pub heights_started: u64,
    /// View changes committed by quorum or override
    pub view_changes: u64,
    /// ChangeView messages sent by this node
    pub change_view_requests: u64,
    pub timeouts: u64,
    pub proposals_sent: u64,
    pub proposals_accepted: u64,
    pub responses_sent: u64,
    pub signatures_received: u64,
    pub blocks_relayed: u64,
    pub payloads_ignored: u64,
    pub transactions_rejected: u64,
}

impl ConsensusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the height and view the engine is in
    pub fn set_round(&self, height: u32, view: u8) {
        self.state.height.store(u64::from(height), Ordering::Relaxed);
        self.state.view.store(u64::from(view), Ordering::Relaxed);
    }

    pub fn inc_heights_started(&self) {
        self.state.heights_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_view_changes(&self) {
        self.state.view_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_change_view_requests(&self) {
        self.state.change_view_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.state.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proposals_sent(&self) {
        self.state.proposals_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_proposals_accepted(&self) {
        self.state.proposals_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_responses_sent(&self) {
        self.state.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signatures_received(&self) {
        self.state.signatures_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocks_relayed(&self) {
        self.state.blocks_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payloads_ignored(&self) {
        self.state.payloads_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transactions_rejected(&self) {
        self.state.transactions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let s = &self.state;
        MetricsSnapshot {
            height: s.height.load(Ordering::Relaxed),
            view: s.view.load(Ordering::Relaxed),
            heights_started: s.heights_started.load(Ordering::Relaxed),
            view_changes: s.view_changes.load(Ordering::Relaxed),
            change_view_requests: s.change_view_requests.load(Ordering::Relaxed),
            timeouts: s.timeouts.load(Ordering::Relaxed),
            proposals_sent: s.proposals_sent.load(Ordering::Relaxed),
            proposals_accepted: s.proposals_accepted.load(Ordering::Relaxed),
            responses_sent: s.responses_sent.load(Ordering::Relaxed),
            signatures_received: s.signatures_received.load(Ordering::Relaxed),
            blocks_relayed: s.blocks_relayed.load(Ordering::Relaxed),
            payloads_ignored: s.payloads_ignored.load(Ordering::Relaxed),
            transactions_rejected: s.transactions_rejected.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        macro_rules! push_metric {
            ($kind:expr, $name:expr, $value:expr, $help:expr) => {
                output.push_str(&format!("# HELP dbft_{} {}\n", $name, $help));
                output.push_str(&format!("# TYPE dbft_{} {}\n", $name, $kind));
                output.push_str(&format!("dbft_{} {}\n", $name, $value));
            };
        }

        push_metric!("gauge", "height", self.height, "Height being agreed upon");
        push_metric!("gauge", "view", self.view, "Current view");
        push_metric!("counter", "heights_started_total", self.heights_started, "Heights started");
        push_metric!("counter", "view_changes_total", self.view_changes, "View changes committed");
        push_metric!(
            "counter",
            "change_view_requests_total",
            self.change_view_requests,
            "ChangeView messages sent"
        );
        push_metric!("counter", "timeouts_total", self.timeouts, "Timer expirations acted upon");
        push_metric!("counter", "proposals_sent_total", self.proposals_sent, "PrepareRequests sent");
        push_metric!(
            "counter",
            "proposals_accepted_total",
            self.proposals_accepted,
            "PrepareRequests adopted"
        );
        push_metric!("counter", "responses_sent_total", self.responses_sent, "PrepareResponses sent");
        push_metric!(
            "counter",
            "signatures_received_total",
            self.signatures_received,
            "Peer signatures stored"
        );
        push_metric!("counter", "blocks_relayed_total", self.blocks_relayed, "Blocks assembled and relayed");
        push_metric!("counter", "payloads_ignored_total", self.payloads_ignored, "Inbound payloads dropped");
        push_metric!(
            "counter",
            "transactions_rejected_total",
            self.transactions_rejected,
            "Proposed transactions rejected"
        );

        output
    }
}
