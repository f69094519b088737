// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Async service loop around the consensus engine.
//!
//! The service owns the engine, the timer and the mailbox. It takes one event
//! at a time, lets the engine handle it, then carries out the actions the
//! engine queued. All mutation of the round context happens on this single
//! task.

mod mailbox;

pub use mailbox::{mailbox, ConsensusEvent, ConsensusHandle, Mailbox, Priority};

use dbft_traits::{Ledger, Policy, Wallet};
use std::sync::Arc;

use crate::engine::{ConsensusAction, ConsensusEngine};
use crate::liveness::ConsensusTimer;
use crate::metrics::ConsensusMetrics;
use crate::network::Transport;

/// Runs a [`ConsensusEngine`] against a [`Transport`].
pub struct ConsensusService<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    engine: ConsensusEngine<L, P, W>,
    timer: ConsensusTimer,
    mailbox: Mailbox<L::Transaction>,
    transport: Arc<dyn Transport<L::Transaction>>,
}

impl<L, P, W> ConsensusService<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    /// Wrap `engine`; the returned handle feeds the service.
    pub fn new(
        engine: ConsensusEngine<L, P, W>,
        transport: Arc<dyn Transport<L::Transaction>>,
    ) -> (Self, ConsensusHandle<L::Transaction>) {
        let (handle, mailbox) = mailbox();
        (
            Self {
                engine,
                timer: ConsensusTimer::new(),
                mailbox,
                transport,
            },
            handle,
        )
    }

    pub fn metrics(&self) -> ConsensusMetrics {
        self.engine.metrics().clone()
    }

    pub fn engine(&self) -> &ConsensusEngine<L, P, W> {
        &self.engine
    }

    /// Process events until shutdown or until every handle is dropped.
    ///
    /// Returns the engine so its final state can be inspected.
    pub async fn run(mut self) -> ConsensusEngine<L, P, W> {
        log::info!("Consensus service running");
        while let Some(event) = self.mailbox.recv(&mut self.timer).await {
            log::trace!("Handling {}", event);
            let result = match event {
                ConsensusEvent::Start => self.engine.start(),
                ConsensusEvent::SetViewNumber(view) => self.engine.set_view(view),
                ConsensusEvent::Timer(key) => self.engine.on_timer(key),
                ConsensusEvent::Payload(bytes) => self.engine.on_payload_bytes(&bytes),
                ConsensusEvent::Transaction(tx) => self.engine.on_transaction(tx),
                ConsensusEvent::BlockPersisted(block) => self.engine.on_block_persisted(&block),
                ConsensusEvent::Shutdown => {
                    log::info!("Consensus service shutting down");
                    break;
                }
            };
            log::trace!("Event {}", result);
            let actions = self.engine.take_actions();
            self.execute(actions).await;
        }
        self.timer.cancel();
        self.engine
    }

    async fn execute(&mut self, actions: Vec<ConsensusAction<L::Transaction>>) {
        let limit = self.engine.config().max_message_size;
        for action in actions {
            let outcome = match action {
                ConsensusAction::Broadcast(payload) => match payload.to_bytes(limit) {
                    Ok(bytes) => self.transport.send_direct(bytes).await,
                    Err(e) => Err(e.into()),
                },
                ConsensusAction::Inventory { kind, hashes } => {
                    self.transport.broadcast_inventory(kind, hashes).await
                }
                ConsensusAction::RelayBlock(block) => self.transport.relay(block).await,
                ConsensusAction::RequestTransactions(hashes) => {
                    self.transport.request_missing(hashes).await
                }
                ConsensusAction::ScheduleTimer { key, delay } => {
                    self.timer.arm(key, delay);
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                log::warn!("Transport failure: {:#}", e);
            }
        }
    }
}
