// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Two-tier event mailbox.
//!
//! Protocol-critical events go through an urgent channel that is always
//! drained first; the start command and transaction notifications wait in an
//! ordinary channel. Timer firings rank with the urgent class.

use anyhow::{anyhow, Result};
use dbft_traits::Transaction;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::block::Block;
use crate::liveness::{ConsensusTimer, TimerKey};
use crate::types::ViewNumber;

/// Scheduling class of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

/// Everything the engine reacts to.
#[derive(Clone, Debug)]
pub enum ConsensusEvent<T: Transaction> {
    /// Begin participating
    Start,
    /// Jump to a view without a quorum
    SetViewNumber(ViewNumber),
    /// A timer armed for this key expired
    Timer(TimerKey),
    /// Encoded payload from a peer
    Payload(Vec<u8>),
    /// Transaction received from the network
    Transaction(T),
    /// The ledger persisted a block
    BlockPersisted(Block<T>),
    /// Stop the service loop
    Shutdown,
}

impl<T: Transaction> ConsensusEvent<T> {
    pub fn priority(&self) -> Priority {
        match self {
            ConsensusEvent::Payload(_)
            | ConsensusEvent::SetViewNumber(_)
            | ConsensusEvent::Timer(_)
            | ConsensusEvent::BlockPersisted(_)
            | ConsensusEvent::Shutdown => Priority::High,
            ConsensusEvent::Start | ConsensusEvent::Transaction(_) => Priority::Low,
        }
    }
}

impl<T: Transaction> fmt::Display for ConsensusEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusEvent::Start => write!(f, "Start"),
            ConsensusEvent::SetViewNumber(v) => write!(f, "SetViewNumber({})", v),
            ConsensusEvent::Timer(key) => write!(f, "Timer({})", key),
            ConsensusEvent::Payload(bytes) => write!(f, "Payload({} bytes)", bytes.len()),
            ConsensusEvent::Transaction(tx) => write!(f, "Transaction({})", tx.hash()),
            ConsensusEvent::BlockPersisted(block) => {
                write!(f, "BlockPersisted({})", block.index())
            }
            ConsensusEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Create a connected handle and mailbox.
pub fn mailbox<T: Transaction>() -> (ConsensusHandle<T>, Mailbox<T>) {
    let (high_tx, high_rx) = mpsc::unbounded_channel();
    let (low_tx, low_rx) = mpsc::unbounded_channel();
    (
        ConsensusHandle { high_tx, low_tx },
        Mailbox { high_rx, low_rx },
    )
}

/// Receiving side, owned by the service loop.
#[derive(Debug)]
pub struct Mailbox<T: Transaction> {
    high_rx: UnboundedReceiver<ConsensusEvent<T>>,
    low_rx: UnboundedReceiver<ConsensusEvent<T>>,
}

impl<T: Transaction> Mailbox<T> {
    /// Next event: urgent events first, then a timer firing, then ordinary
    /// events.
    ///
    /// Returns `None` once every handle has been dropped.
    pub async fn recv(&mut self, timer: &mut ConsensusTimer) -> Option<ConsensusEvent<T>> {
        tokio::select! {
            biased;
            event = self.high_rx.recv() => event,
            key = timer.fired() => Some(ConsensusEvent::Timer(key)),
            event = self.low_rx.recv() => event,
        }
    }
}

/// Cloneable sending side used by the ledger, the network and operators.
#[derive(Debug)]
pub struct ConsensusHandle<T: Transaction> {
    high_tx: UnboundedSender<ConsensusEvent<T>>,
    low_tx: UnboundedSender<ConsensusEvent<T>>,
}

impl<T: Transaction> Clone for ConsensusHandle<T> {
    fn clone(&self) -> Self {
        Self {
            high_tx: self.high_tx.clone(),
            low_tx: self.low_tx.clone(),
        }
    }
}

impl<T: Transaction> ConsensusHandle<T> {
    /// Queue `event` in the channel matching its priority.
    pub fn send(&self, event: ConsensusEvent<T>) -> Result<()> {
        let tx = match event.priority() {
            Priority::High => &self.high_tx,
            Priority::Low => &self.low_tx,
        };
        tx.send(event)
            .map_err(|e| anyhow!("consensus service stopped, dropped {}", e.0))
    }

    pub fn start(&self) -> Result<()> {
        self.send(ConsensusEvent::Start)
    }

    pub fn set_view(&self, view: ViewNumber) -> Result<()> {
        self.send(ConsensusEvent::SetViewNumber(view))
    }

    pub fn deliver_payload(&self, payload: Vec<u8>) -> Result<()> {
        self.send(ConsensusEvent::Payload(payload))
    }

    pub fn transaction_seen(&self, tx: T) -> Result<()> {
        self.send(ConsensusEvent::Transaction(tx))
    }

    pub fn height_committed(&self, block: Block<T>) -> Result<()> {
        self.send(ConsensusEvent::BlockPersisted(block))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ConsensusEvent::Shutdown)
    }

    /// Whether the service loop has exited.
    pub fn is_closed(&self) -> bool {
        self.high_tx.is_closed()
    }
}
