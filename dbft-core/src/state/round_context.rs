// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use dbft_traits::{Hash160, Hash256, PublicKey, Signature, Transaction};
use std::collections::HashMap;

use crate::block::{merkle_root, Block, BlockHeader, Witness};
use crate::state::flags::{StateFlags, Transition};
use crate::types::{primary_index, quorum, BlockIndex, Role, ViewNumber, BLOCK_VERSION};

/// Fields chosen by the primary for one proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    /// Block timestamp, in seconds
    pub timestamp: u32,

    /// Header nonce
    pub nonce: u64,

    /// Address of the validator set for the next height
    pub next_consensus: Hash160,

    /// Ordered transaction hashes; index 0 is the reward transaction
    pub transaction_hashes: Vec<Hash256>,
}

/// All consensus state for one block height attempt.
///
/// A context is created when a height starts and mutated in place when the
/// view changes. The validator table, the signature table and the
/// expected-view table are sized once and keep exactly one slot per validator
/// for the life of the context.
#[derive(Clone, Debug)]
pub struct RoundContext<T: Transaction> {
    /// Height being agreed upon
    block_index: BlockIndex,

    /// Hash of the previous block
    prev_hash: Hash256,

    /// Timestamp of the previous block
    prev_timestamp: u32,

    /// Current view within this height
    view_number: ViewNumber,

    /// Validator set of this height, in index order
    validators: Vec<PublicKey>,

    /// Position of this node in `validators`
    my_index: Option<usize>,

    /// Primary of the current view
    primary_index: usize,

    /// Progress within the current view
    state: StateFlags,

    /// Proposal fields, absent until a proposal is built or adopted
    proposal: Option<Proposal>,

    /// Resolved proposal transactions
    transactions: HashMap<Hash256, T>,

    /// Signatures over the current header, by validator index
    signatures: Vec<Option<Signature>>,

    /// Last view each validator asked to move to
    expected_view: Vec<ViewNumber>,

    /// Memoized header for `proposal`
    header: Option<BlockHeader>,
}

impl<T: Transaction> RoundContext<T> {
    /// Create a fresh context at view 0.
    ///
    /// An empty validator set yields a context in which nobody has a role.
    pub fn new(
        block_index: BlockIndex,
        prev_hash: Hash256,
        prev_timestamp: u32,
        validators: Vec<PublicKey>,
        my_index: Option<usize>,
    ) -> Self {
        let n = validators.len();
        let primary_index = primary_for(block_index, 0, n);
        let my_index = my_index.filter(|i| *i < n);
        let mut context = Self {
            block_index,
            prev_hash,
            prev_timestamp,
            view_number: 0,
            validators,
            my_index,
            primary_index,
            state: StateFlags::INITIAL,
            proposal: None,
            transactions: HashMap::new(),
            signatures: vec![None; n],
            expected_view: vec![0; n],
            header: None,
        };
        context.state = StateFlags::INITIAL.apply(Transition::StartHeight(context.role()));
        context
    }

    /// Move to `view` within the same height.
    ///
    /// Only `SignatureSent` survives; without it the proposal and the signature
    /// table are discarded. This node's expected view is set to `view`.
    pub fn change_view(&mut self, view: ViewNumber) {
        self.view_number = view;
        self.primary_index = primary_for(self.block_index, view, self.validators.len());
        self.state = self.state.apply(Transition::ChangeView(self.role()));
        if !self.state.contains(StateFlags::SIGNATURE_SENT) {
            self.proposal = None;
            self.transactions.clear();
            self.signatures = vec![None; self.validators.len()];
        }
        if let Some(i) = self.my_index {
            self.expected_view[i] = view;
        }
        self.header = None;
    }

    pub fn block_index(&self) -> BlockIndex {
        self.block_index
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.prev_hash
    }

    pub fn prev_timestamp(&self) -> u32 {
        self.prev_timestamp
    }

    pub fn view_number(&self) -> ViewNumber {
        self.view_number
    }

    pub fn validators(&self) -> &[PublicKey] {
        &self.validators
    }

    /// Number of validators (`N`).
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Required agreement count (`M`).
    pub fn quorum(&self) -> usize {
        quorum(self.validators.len())
    }

    pub fn my_index(&self) -> Option<usize> {
        self.my_index
    }

    pub fn primary_index(&self) -> usize {
        self.primary_index
    }

    /// Role of this node in the current view.
    pub fn role(&self) -> Role {
        match self.my_index {
            None => Role::None,
            Some(i) if i == self.primary_index => Role::Primary,
            Some(_) => Role::Backup,
        }
    }

    pub fn state(&self) -> StateFlags {
        self.state
    }

    /// Whether every bit of `flags` is set.
    pub fn has(&self, flags: StateFlags) -> bool {
        self.state.contains(flags)
    }

    /// Record progress within the view.
    pub fn apply(&mut self, transition: Transition) {
        self.state = self.state.apply(transition);
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// Ordered transaction hashes of the current proposal.
    pub fn transaction_hashes(&self) -> Option<&[Hash256]> {
        self.proposal.as_ref().map(|p| p.transaction_hashes.as_slice())
    }

    /// Whether `hash` is part of the current proposal.
    pub fn is_proposed(&self, hash: &Hash256) -> bool {
        self.transaction_hashes()
            .map(|hashes| hashes.contains(hash))
            .unwrap_or(false)
    }

    /// Replace the proposal. Previously resolved transactions are dropped.
    pub fn set_proposal(&mut self, proposal: Proposal) {
        self.proposal = Some(proposal);
        self.transactions.clear();
        self.header = None;
    }

    /// Header this context would produce for `proposal`.
    pub fn header_for(&self, proposal: &Proposal) -> BlockHeader {
        BlockHeader {
            version: BLOCK_VERSION,
            prev_hash: self.prev_hash,
            merkle_root: merkle_root(&proposal.transaction_hashes),
            timestamp: proposal.timestamp,
            index: self.block_index,
            nonce: proposal.nonce,
            next_consensus: proposal.next_consensus,
        }
    }

    /// Header of the current proposal, built on first use.
    pub fn header(&mut self) -> Option<BlockHeader> {
        if self.header.is_none() {
            self.header = self.proposal.as_ref().map(|p| self.header_for(p));
        }
        self.header.clone()
    }

    pub fn transactions(&self) -> &HashMap<Hash256, T> {
        &self.transactions
    }

    pub fn transaction(&self, hash: &Hash256) -> Option<&T> {
        self.transactions.get(hash)
    }

    pub fn has_transaction(&self, hash: &Hash256) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn insert_transaction(&mut self, tx: T) {
        self.transactions.insert(tx.hash(), tx);
    }

    /// Whether every proposed hash has a resolved transaction.
    pub fn has_all_transactions(&self) -> bool {
        match self.transaction_hashes() {
            Some(hashes) => hashes.iter().all(|h| self.transactions.contains_key(h)),
            None => false,
        }
    }

    /// Proposed hashes without a resolved transaction, in proposal order.
    pub fn missing_transactions(&self) -> Vec<Hash256> {
        self.transaction_hashes()
            .map(|hashes| {
                hashes
                    .iter()
                    .filter(|h| !self.transactions.contains_key(*h))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolved transactions in proposal order.
    pub fn ordered_transactions(&self) -> Option<Vec<T>> {
        self.transaction_hashes()?
            .iter()
            .map(|h| self.transactions.get(h).cloned())
            .collect()
    }

    pub fn signatures(&self) -> &[Option<Signature>] {
        &self.signatures
    }

    pub fn signature(&self, index: usize) -> Option<&Signature> {
        self.signatures.get(index).and_then(|s| s.as_ref())
    }

    /// Store the signature of validator `index`. Out of range indices are ignored.
    pub fn set_signature(&mut self, index: usize, signature: Signature) {
        if let Some(slot) = self.signatures.get_mut(index) {
            *slot = Some(signature);
        }
    }

    /// Number of stored signatures.
    pub fn signature_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    /// Drop every stored signature that `is_valid` rejects for its validator.
    ///
    /// Returns the indices that were cleared.
    pub fn retain_signatures<F>(&mut self, mut is_valid: F) -> Vec<usize>
    where
        F: FnMut(&Signature, &PublicKey) -> bool,
    {
        let mut cleared = Vec::new();
        for (i, slot) in self.signatures.iter_mut().enumerate() {
            if let Some(sig) = slot {
                if !is_valid(sig, &self.validators[i]) {
                    *slot = None;
                    cleared.push(i);
                }
            }
        }
        cleared
    }

    pub fn expected_view(&self, index: usize) -> ViewNumber {
        self.expected_view.get(index).copied().unwrap_or(0)
    }

    pub fn expected_views(&self) -> &[ViewNumber] {
        &self.expected_view
    }

    /// Record the view validator `index` asked to move to.
    pub fn set_expected_view(&mut self, index: usize, view: ViewNumber) {
        if let Some(slot) = self.expected_view.get_mut(index) {
            *slot = view;
        }
    }

    /// Number of validators whose expected view is exactly `view`.
    pub fn count_expected_view(&self, view: ViewNumber) -> usize {
        self.expected_view.iter().filter(|v| **v == view).count()
    }

    /// Assemble the signed block once `M` signatures and every transaction
    /// are present.
    pub fn make_block(&mut self) -> Option<Block<T>> {
        if self.signature_count() < self.quorum() {
            return None;
        }
        let transactions = self.ordered_transactions()?;
        let header = self.header()?;
        Some(Block {
            header,
            transactions,
            witness: Witness::from_signatures(&self.validators, &self.signatures),
        })
    }
}

fn primary_for(block_index: BlockIndex, view: ViewNumber, n: usize) -> usize {
    if n == 0 {
        0
    } else {
        primary_index(block_index, view, n)
    }
}
