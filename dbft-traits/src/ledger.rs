// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Ledger and policy traits for consensus.
//!
//! The consensus engine does not own chain state. Everything it needs to know
//! about the chain (height, head, validators, mempool, transaction validity) comes
//! through [`Ledger`], and node-local admission rules come through [`Policy`].
//!
//! Both traits are synchronous: the engine treats every lookup as instantaneous
//! and consumes the result immediately.

use crate::core::{Amount, Hash256, PublicKey};
use crate::transaction::Transaction;

/// Read-mostly view of the persisted chain and its mempool.
///
/// # Requirements
///
/// Implementations must be:
/// - Thread-safe (Send + Sync)
/// - Internally consistent: `current_height`, `current_head_hash` and
///   `current_head_timestamp` describe the same block
pub trait Ledger: Send + Sync {
    /// Transaction type stored in this ledger.
    type Transaction: Transaction;

    /// Height of the last persisted block.
    fn current_height(&self) -> u32;

    /// Hash of the last persisted block.
    fn current_head_hash(&self) -> Hash256;

    /// Timestamp (seconds) of the last persisted block.
    fn current_head_timestamp(&self) -> u32;

    /// Ordered validator set for `height`, taking into account the effect of
    /// `extra` transactions that are not yet persisted.
    fn validators_for(&self, height: u32, extra: &[Self::Transaction]) -> Vec<PublicKey>;

    /// Verified transactions currently waiting in the mempool.
    fn mempool(&self) -> Vec<Self::Transaction>;

    /// Look up a verified mempool transaction.
    fn mempool_transaction(&self, hash: &Hash256) -> Option<Self::Transaction> {
        self.mempool().into_iter().find(|tx| tx.hash() == *hash)
    }

    /// Look up a transaction that has been received but not yet verified.
    fn unverified_transaction(&self, hash: &Hash256) -> Option<Self::Transaction>;

    /// Whether a transaction with this hash is already persisted.
    fn contains_transaction(&self, hash: &Hash256) -> bool;

    /// Full validity check of a transaction against the current chain state.
    fn verify(&self, tx: &Self::Transaction) -> bool;

    /// Net fee paid by a set of transactions.
    fn net_fee(&self, txs: &[Self::Transaction]) -> Amount;
}

/// Node-local transaction policy.
pub trait Policy<T: Transaction>: Send + Sync {
    /// Select the transactions allowed into a block, in order.
    fn filter_for_block(&self, txs: Vec<T>) -> Vec<T>;

    /// Whether a single transaction is acceptable.
    fn filter_for_mempool(&self, tx: &T) -> bool;
}
