// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Delegated BFT protocol engine.
//!
//! This module provides the state machine that drives one node through the
//! consensus protocol, independent of any transport or runtime.
//!
//! # Overview
//!
//! The engine is responsible for:
//! - Starting each height and choosing the node's role
//! - Building the proposal when primary, validating it when backup
//! - Collecting signatures and assembling the block
//! - Requesting and committing view changes
//!
//! # Sans-io Design
//!
//! The engine processes one event at a time and never blocks. Everything it
//! wants done outside (sending payloads, relaying blocks, arming the timer) is
//! queued as a [`ConsensusAction`] and drained with
//! [`ConsensusEngine::take_actions`]. The service loop in
//! [`crate::service`] executes them.
//!
//! # Generic Design
//!
//! The engine is generic over:
//! - `L`: chain access implementing [`Ledger`]
//! - `P`: transaction policy implementing [`Policy`]
//! - `W`: key store implementing [`Wallet`]

mod inbound;
mod proposal;

use dbft_traits::{Clock, Hash256, Ledger, Policy, Signature, Wallet};
use std::sync::Arc;
use std::time::Duration;

use crate::block::Block;
use crate::config::ConsensusConfig;
use crate::liveness::{TimeoutSchedule, TimerKey};
use crate::messages::{ChangeView, ConsensusMessage, ConsensusPayload};
use crate::metrics::ConsensusMetrics;
use crate::network::{IgnoreReason, ProcessResult};
use crate::state::{RoundContext, StateFlags, Transition};
use crate::types::{InventoryKind, Role, ValidatorIndex, ViewNumber, PROTOCOL_VERSION};

/// Work the engine asks its environment to perform.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsensusAction<T: dbft_traits::Transaction> {
    /// Send a signed payload to every validator
    Broadcast(ConsensusPayload),

    /// Announce held items to peers
    Inventory {
        kind: InventoryKind,
        hashes: Vec<Hash256>,
    },

    /// Hand over an assembled block
    RelayBlock(Block<T>),

    /// Fetch transactions this node is missing
    RequestTransactions(Vec<Hash256>),

    /// Arm the timer, replacing any outstanding deadline
    ScheduleTimer { key: TimerKey, delay: Duration },
}

/// Consensus state machine for one node.
///
/// # Type Parameters
///
/// * `L`: Ledger type - must implement the [`Ledger`] trait
/// * `P`: Policy type - must implement the [`Policy`] trait
/// * `W`: Wallet type - must implement the [`Wallet`] trait
pub struct ConsensusEngine<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    ledger: Arc<L>,
    policy: Arc<P>,
    wallet: Arc<W>,
    clock: Arc<dyn Clock>,

    /// Configuration
    config: ConsensusConfig,

    /// Timer durations per view
    schedule: TimeoutSchedule,

    metrics: ConsensusMetrics,

    /// State of the height being worked on
    context: RoundContext<L::Transaction>,

    /// Signing key for `context.my_index()`
    key_pair: Option<W::KeyPair>,

    started: bool,

    /// Local time (ms) at which the previous block was persisted
    block_received_at: Option<u64>,

    /// Actions queued since the last `take_actions`
    actions: Vec<ConsensusAction<L::Transaction>>,
}

impl<L, P, W> ConsensusEngine<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    /// Create an engine. Nothing happens until [`ConsensusEngine::start`].
    ///
    /// `config` is expected to have passed [`ConsensusConfig::validate`].
    pub fn new(
        ledger: Arc<L>,
        policy: Arc<P>,
        wallet: Arc<W>,
        clock: Arc<dyn Clock>,
        config: ConsensusConfig,
    ) -> Self {
        let schedule = TimeoutSchedule::from_config(&config);
        Self {
            ledger,
            policy,
            wallet,
            clock,
            config,
            schedule,
            metrics: ConsensusMetrics::new(),
            context: RoundContext::new(0, Hash256::zero(), 0, Vec::new(), None),
            key_pair: None,
            started: false,
            block_received_at: None,
            actions: Vec::new(),
        }
    }

    /// Report into `metrics` instead of a private set of counters.
    pub fn with_metrics(mut self, metrics: ConsensusMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn context(&self) -> &RoundContext<L::Transaction> {
        &self.context
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ConsensusMetrics {
        &self.metrics
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Drain the actions queued so far.
    pub fn take_actions(&mut self) -> Vec<ConsensusAction<L::Transaction>> {
        std::mem::take(&mut self.actions)
    }

    /// Begin participating at the height after the ledger head.
    pub fn start(&mut self) -> ProcessResult {
        if self.started {
            return ProcessResult::ignored(IgnoreReason::AlreadyStarted);
        }
        log::info!("Starting consensus at height {}", self.ledger.current_height().saturating_add(1));
        self.started = true;
        self.initialize_consensus(0);
        ProcessResult::Accepted
    }

    /// Jump to `view` without waiting for a quorum. View 0 restarts the height.
    pub fn set_view(&mut self, view: ViewNumber) -> ProcessResult {
        if !self.started {
            return ProcessResult::ignored(IgnoreReason::NotStarted);
        }
        log::info!("Setting view to {} by request", view);
        self.initialize_consensus(view);
        ProcessResult::Accepted
    }

    /// The ledger persisted `block`; move on to the next height.
    pub fn on_block_persisted(&mut self, block: &Block<L::Transaction>) -> ProcessResult {
        if !self.started {
            return ProcessResult::ignored(IgnoreReason::NotStarted);
        }
        log::info!(
            "Persisted block {} at height {} ({} transactions)",
            block.hash(),
            block.index(),
            block.transactions.len()
        );
        self.block_received_at = Some(self.clock.now_millis());
        self.initialize_consensus(0);
        ProcessResult::Accepted
    }

    /// Handle a timer armed for `key`.
    pub fn on_timer(&mut self, key: TimerKey) -> ProcessResult {
        if !self.started {
            return ProcessResult::ignored(IgnoreReason::NotStarted);
        }
        if self.context.has(StateFlags::BLOCK_SENT) {
            return ProcessResult::ignored(IgnoreReason::BlockSent);
        }
        if key != self.current_key() {
            log::debug!("Ignoring stale timer {} (now {})", key, self.current_key());
            return ProcessResult::ignored(IgnoreReason::StaleTimer);
        }
        log::info!("Timeout: {} state={}", key, self.context.state());

        match self.context.role() {
            Role::Primary if !self.context.has(StateFlags::REQUEST_SENT) => {
                self.send_prepare_request();
                ProcessResult::Accepted
            }
            Role::Primary | Role::Backup => {
                self.metrics.inc_timeouts();
                self.request_change_view();
                ProcessResult::Accepted
            }
            Role::None => ProcessResult::ignored(IgnoreReason::NotValidator),
        }
    }

    /// Reset the context for `view`.
    ///
    /// View 0 starts a new height from the ledger snapshot. Any other view
    /// moves the current height's context to that view.
    fn initialize_consensus(&mut self, view: ViewNumber) {
        if view == 0 {
            self.reset_height();
        } else {
            self.context.change_view(view);
            self.metrics.inc_view_changes();
        }
        self.metrics
            .set_round(self.context.block_index(), self.context.view_number());

        let my_index = match self.context.my_index() {
            Some(i) => i,
            None => {
                log::info!(
                    "Observing height {} view {}: not a validator",
                    self.context.block_index(),
                    view
                );
                return;
            }
        };
        let role = self.context.role();
        log::info!(
            "Initialize: height={} view={} index={} role={} primary={}",
            self.context.block_index(),
            view,
            my_index,
            role,
            self.context.primary_index()
        );

        let delay = match role {
            Role::Primary => {
                let now = self.clock.now_millis();
                let elapsed = self
                    .block_received_at
                    .map(|at| Duration::from_millis(now.saturating_sub(at)));
                self.schedule.primary_delay(elapsed)
            }
            _ => self.schedule.backoff(view),
        };
        self.schedule_timer(delay);
    }

    fn reset_height(&mut self) {
        let block_index = self.ledger.current_height().saturating_add(1);
        let validators = self.ledger.validators_for(block_index, &[]);
        let mut my_index = None;
        let mut key_pair = None;
        for (i, key) in validators.iter().enumerate() {
            if let Some(pair) = self.wallet.account_for(key) {
                my_index = Some(i);
                key_pair = Some(pair);
                break;
            }
        }
        self.key_pair = key_pair;
        self.context = RoundContext::new(
            block_index,
            self.ledger.current_head_hash(),
            self.ledger.current_head_timestamp(),
            validators,
            my_index,
        );
        self.metrics.inc_heights_started();
    }

    fn current_key(&self) -> TimerKey {
        TimerKey::new(self.context.block_index(), self.context.view_number())
    }

    fn schedule_timer(&mut self, delay: Duration) {
        let key = self.current_key();
        self.actions.push(ConsensusAction::ScheduleTimer { key, delay });
    }

    /// Ask to move one view past what this node expects now.
    fn request_change_view(&mut self) {
        let Some(my_index) = self.context.my_index() else {
            return;
        };
        let Some(new_view) = self.context.expected_view(my_index).checked_add(1) else {
            log::warn!("Cannot request a view change past view {}", ViewNumber::MAX);
            self.schedule_timer(self.schedule.backoff(ViewNumber::MAX));
            return;
        };
        self.context.apply(Transition::ViewChanging);
        self.context.set_expected_view(my_index, new_view);
        log::warn!(
            "Request change view: height={} view={} nv={} state={}",
            self.context.block_index(),
            self.context.view_number(),
            new_view,
            self.context.state()
        );
        self.schedule_timer(self.schedule.backoff(new_view));
        self.broadcast(
            ChangeView {
                view_number: self.context.view_number(),
                new_view_number: new_view,
            }
            .into(),
        );
        self.metrics.inc_change_view_requests();
        self.check_expected_view(new_view);
    }

    /// Move to `view` once a quorum of validators expects it.
    fn check_expected_view(&mut self, view: ViewNumber) {
        if view <= self.context.view_number() {
            return;
        }
        if self.context.count_expected_view(view) >= self.context.quorum() {
            self.initialize_consensus(view);
        }
    }

    /// Sign `message` into a payload and queue it for every validator.
    fn broadcast(&mut self, message: ConsensusMessage<L::Transaction>) {
        let (Some(my_index), Some(key_pair)) = (self.context.my_index(), self.key_pair.as_ref())
        else {
            return;
        };
        let data = match message.encode(self.config.max_message_size) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Failed to encode {}: {}", message.kind(), e);
                return;
            }
        };
        let timestamp = self
            .context
            .proposal()
            .map(|p| p.timestamp)
            .unwrap_or_else(|| self.clock.now_secs());
        let mut payload = ConsensusPayload {
            version: PROTOCOL_VERSION,
            prev_hash: self.context.prev_hash(),
            block_index: self.context.block_index(),
            validator_index: my_index as ValidatorIndex,
            timestamp,
            data,
            witness: Signature::zero(),
        };
        payload.sign(self.wallet.as_ref(), key_pair);
        self.actions.push(ConsensusAction::Broadcast(payload));
    }

    /// Assemble and relay the block once enough signatures are present.
    fn check_signatures(&mut self) {
        if let Some(block) = self.context.make_block() {
            log::info!(
                "Relay block: height={} hash={} tx={}",
                block.index(),
                block.hash(),
                block.transactions.len()
            );
            self.context.apply(Transition::BlockSent);
            self.metrics.inc_blocks_relayed();
            self.actions.push(ConsensusAction::RelayBlock(block));
        }
    }
}

#[cfg(test)]
mod tests;
