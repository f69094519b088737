// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Network surface of the consensus engine.
//!
//! The engine never talks to peers directly. It queues actions, and the
//! service loop hands them to a [`Transport`]. Inbound events report a
//! [`ProcessResult`] describing what the engine did with them.

use async_trait::async_trait;
use dbft_traits::{Hash256, Transaction};
use std::fmt::{self, Debug, Display};

use crate::block::Block;
use crate::types::InventoryKind;

/// Outbound side of the peer-to-peer network.
///
/// Failures are reported to the service loop, which logs them and carries on;
/// consensus recovers from lost messages through view changes.
#[async_trait]
pub trait Transport<T: Transaction>: Send + Sync {
    /// Deliver an encoded consensus payload to every connected validator.
    async fn send_direct(&self, payload: Vec<u8>) -> anyhow::Result<()>;

    /// Announce that this node holds items of `kind` with these hashes.
    async fn broadcast_inventory(&self, kind: InventoryKind, hashes: Vec<Hash256>)
        -> anyhow::Result<()>;

    /// Hand a committed block to the node for persistence and propagation.
    async fn relay(&self, block: Block<T>) -> anyhow::Result<()>;

    /// Ask peers for transactions this node does not have.
    async fn request_missing(&self, hashes: Vec<Hash256>) -> anyhow::Result<()>;
}

/// Why an inbound event left the context unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The engine has not been started
    NotStarted,
    /// The engine is already running
    AlreadyStarted,
    /// The block for this height is already assembled
    BlockSent,
    /// This node is not a validator for the height
    NotValidator,
    /// The payload was sent by this node
    OwnPayload,
    /// Protocol version differs
    VersionMismatch,
    /// Previous hash or height differ from the context
    WrongHeight,
    /// Sender index outside the validator set
    UnknownValidator,
    /// Payload witness does not verify
    InvalidWitness,
    /// Payload or message failed to decode
    Malformed,
    /// Message belongs to another view
    WrongView,
    /// Timer armed for a superseded height or view
    StaleTimer,
    /// ChangeView target not above what the sender announced before
    StaleViewChange,
    /// A PrepareRequest was already adopted in this view
    AlreadyReceived,
    /// This node is not a backup in the view
    NotBackup,
    /// The PrepareRequest was not sent by the primary
    NotPrimary,
    /// Proposal timestamp outside the accepted band
    InvalidTimestamp,
    /// A proposed transaction is already on chain
    KnownTransaction,
    /// A signature does not verify against the header
    InvalidSignature,
    /// A signature for this validator is already stored
    DuplicateSignature,
    /// No transaction is being waited for
    NotCollecting,
    /// Transaction not part of the proposal, or already held
    Irrelevant,
}

impl Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Result of processing an inbound event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// The event changed the context or produced actions
    Accepted,

    /// The event was dropped
    Ignored(IgnoreReason),
}

impl ProcessResult {
    /// Create an ignored result.
    pub fn ignored(reason: IgnoreReason) -> Self {
        ProcessResult::Ignored(reason)
    }

    /// Check if the result indicates acceptance.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ProcessResult::Accepted)
    }

    /// Reason the event was dropped, if it was.
    pub fn ignore_reason(&self) -> Option<IgnoreReason> {
        match self {
            ProcessResult::Accepted => None,
            ProcessResult::Ignored(reason) => Some(*reason),
        }
    }
}

impl Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessResult::Accepted => write!(f, "accepted"),
            ProcessResult::Ignored(reason) => write!(f, "ignored ({})", reason),
        }
    }
}
