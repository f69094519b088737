// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use dbft_traits::{Amount, Hash256, Ledger, Policy, PublicKey, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::MockTransaction;
use crate::block::Block;

/// Chain state kept in memory.
#[derive(Debug)]
struct LedgerState {
    height: u32,
    head_hash: Hash256,
    head_timestamp: u32,
    mempool: Vec<MockTransaction>,
    unverified: HashMap<Hash256, MockTransaction>,
    committed: HashSet<Hash256>,
    invalid: HashSet<Hash256>,
    blocks: Vec<Block<MockTransaction>>,
}

/// An in-memory [`Ledger`] with a fixed validator set.
///
/// Starts at a genesis block of height 0. Blocks are appended with
/// [`MemoryLedger::persist`].
#[derive(Debug)]
pub struct MemoryLedger {
    validators: Vec<PublicKey>,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new(validators: Vec<PublicKey>) -> Self {
        Self {
            validators,
            state: RwLock::new(LedgerState {
                height: 0,
                head_hash: Self::genesis_hash(),
                head_timestamp: 0,
                mempool: Vec::new(),
                unverified: HashMap::new(),
                committed: HashSet::new(),
                invalid: HashSet::new(),
                blocks: Vec::new(),
            }),
        }
    }

    /// Hash of the genesis block every ledger starts from.
    pub fn genesis_hash() -> Hash256 {
        Hash256::digest(b"genesis")
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a verified transaction to the mempool, unless already known.
    pub fn add_to_mempool(&self, tx: MockTransaction) -> bool {
        let hash = tx.hash();
        let mut state = self.write();
        if state.committed.contains(&hash) || state.mempool.iter().any(|t| t.hash() == hash) {
            return false;
        }
        state.unverified.remove(&hash);
        state.mempool.push(tx);
        true
    }

    /// Record a transaction that has been received but not verified.
    pub fn add_unverified(&self, tx: MockTransaction) {
        let hash = tx.hash();
        self.write().unverified.insert(hash, tx);
    }

    /// Make [`Ledger::verify`] fail for `hash`.
    pub fn mark_invalid(&self, hash: Hash256) {
        self.write().invalid.insert(hash);
    }

    /// Append `block` if it extends the head. Returns whether it was appended.
    pub fn persist(&self, block: &Block<MockTransaction>) -> bool {
        let mut state = self.write();
        if block.index() != state.height.saturating_add(1)
            || block.header.prev_hash != state.head_hash
        {
            return false;
        }
        let hashes: HashSet<Hash256> = block.transactions.iter().map(|tx| tx.hash()).collect();
        state.mempool.retain(|tx| !hashes.contains(&tx.hash()));
        state.unverified.retain(|hash, _| !hashes.contains(hash));
        state.committed.extend(hashes);
        state.height = block.index();
        state.head_hash = block.hash();
        state.head_timestamp = block.header.timestamp;
        state.blocks.push(block.clone());
        true
    }

    /// Blocks persisted since genesis, in order.
    pub fn blocks(&self) -> Vec<Block<MockTransaction>> {
        self.read().blocks.clone()
    }
}

impl Ledger for MemoryLedger {
    type Transaction = MockTransaction;

    fn current_height(&self) -> u32 {
        self.read().height
    }

    fn current_head_hash(&self) -> Hash256 {
        self.read().head_hash
    }

    fn current_head_timestamp(&self) -> u32 {
        self.read().head_timestamp
    }

    fn validators_for(&self, _height: u32, _extra: &[MockTransaction]) -> Vec<PublicKey> {
        self.validators.clone()
    }

    fn mempool(&self) -> Vec<MockTransaction> {
        self.read().mempool.clone()
    }

    fn unverified_transaction(&self, hash: &Hash256) -> Option<MockTransaction> {
        self.read().unverified.get(hash).cloned()
    }

    fn contains_transaction(&self, hash: &Hash256) -> bool {
        self.read().committed.contains(hash)
    }

    fn verify(&self, tx: &MockTransaction) -> bool {
        let hash = tx.hash();
        let state = self.read();
        !state.invalid.contains(&hash) && !state.committed.contains(&hash)
    }

    fn net_fee(&self, txs: &[MockTransaction]) -> Amount {
        txs.iter().filter(|tx| !tx.reward).map(|tx| tx.fee).sum()
    }
}

/// Policy that accepts everything, in mempool order.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllPolicy;

impl<T: Transaction> Policy<T> for AllowAllPolicy {
    fn filter_for_block(&self, txs: Vec<T>) -> Vec<T> {
        txs
    }

    fn filter_for_mempool(&self, _tx: &T) -> bool {
        true
    }
}

/// Policy that refuses a fixed set of transaction hashes.
#[derive(Clone, Debug, Default)]
pub struct DenyListPolicy {
    denied: HashSet<Hash256>,
}

impl DenyListPolicy {
    pub fn new(denied: impl IntoIterator<Item = Hash256>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }
}

impl<T: Transaction> Policy<T> for DenyListPolicy {
    fn filter_for_block(&self, txs: Vec<T>) -> Vec<T> {
        txs.into_iter()
            .filter(|tx| !self.denied.contains(&tx.hash()))
            .collect()
    }

    fn filter_for_mempool(&self, tx: &T) -> bool {
        !self.denied.contains(&tx.hash())
    }
}
