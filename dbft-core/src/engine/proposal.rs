// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Building, completing and checking the proposal.

use dbft_traits::{Ledger, Policy, Transaction, Wallet};

use super::{ConsensusAction, ConsensusEngine};
use crate::block::next_consensus_address;
use crate::messages::{PrepareRequest, PrepareResponse};
use crate::network::{IgnoreReason, ProcessResult};
use crate::state::{Proposal, StateFlags, Transition};
use crate::types::InventoryKind;

impl<L, P, W> ConsensusEngine<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    /// A transaction arrived from the network while a proposal may be waiting
    /// for it.
    pub fn on_transaction(&mut self, tx: L::Transaction) -> ProcessResult {
        if !self.started {
            return ProcessResult::ignored(IgnoreReason::NotStarted);
        }
        let state = self.context.state();
        if !state.contains(StateFlags::BACKUP)
            || !state.contains(StateFlags::REQUEST_RECEIVED)
            || state.contains(StateFlags::SIGNATURE_SENT)
            || state.contains(StateFlags::VIEW_CHANGING)
            || state.contains(StateFlags::BLOCK_SENT)
        {
            return ProcessResult::ignored(IgnoreReason::NotCollecting);
        }
        let hash = tx.hash();
        if self.context.has_transaction(&hash) || !self.context.is_proposed(&hash) {
            return ProcessResult::ignored(IgnoreReason::Irrelevant);
        }
        self.add_transaction(tx, true);
        ProcessResult::Accepted
    }

    /// Primary timer fired: broadcast the proposal for this view.
    pub(super) fn send_prepare_request(&mut self) {
        let Some(my_index) = self.context.my_index() else {
            return;
        };
        log::info!(
            "Send prepare request: height={} view={}",
            self.context.block_index(),
            self.context.view_number()
        );
        self.context.apply(Transition::RequestSent);

        // A proposal signed in an earlier view is offered again unchanged.
        if !self.context.has(StateFlags::SIGNATURE_SENT) || self.context.proposal().is_none() {
            self.fill_context();
            if let (Some(header), Some(key_pair)) = (self.context.header(), self.key_pair.as_ref()) {
                let hash_data = header.hash_data();
                let wallet = self.wallet.as_ref();
                self.context
                    .retain_signatures(|sig, key| wallet.verify(&hash_data, sig, key));
                let signature = wallet.sign(&hash_data, key_pair);
                self.context.set_signature(my_index, signature);
            }
        }

        let Some(request) = self.make_prepare_request() else {
            log::warn!("Proposal incomplete, requesting view change");
            self.request_change_view();
            return;
        };
        let hashes = request.transaction_hashes.clone();
        self.broadcast(request.into());
        self.metrics.inc_proposals_sent();

        if hashes.len() > 1 {
            self.actions.push(ConsensusAction::Inventory {
                kind: InventoryKind::Transaction,
                hashes: hashes[1..].to_vec(),
            });
        }
        self.schedule_timer(self.schedule.backoff(self.context.view_number()));
        // A lone validator is its own quorum.
        self.check_signatures();
    }

    /// Select transactions from the mempool and build the reward transaction.
    fn fill_context(&mut self) {
        let mut transactions = self.policy.filter_for_block(self.ledger.mempool());
        transactions.retain(|tx| !tx.is_reward());
        transactions.truncate(self.config.max_transactions_per_block);

        let fee = self.ledger.net_fee(&transactions);
        let recipient = self
            .context
            .my_index()
            .map(|i| self.context.validators()[i].script_hash());
        let (nonce, reward) = loop {
            let nonce = rand::random::<u64>();
            let reward = L::Transaction::new_reward(nonce, fee, recipient);
            if !self.ledger.contains_transaction(&reward.hash()) {
                break (nonce, reward);
            }
        };
        transactions.insert(0, reward);

        let next_validators = self
            .ledger
            .validators_for(self.context.block_index().saturating_add(1), &transactions);
        let timestamp = self
            .clock
            .now_secs()
            .max(self.context.prev_timestamp().saturating_add(1));

        self.context.set_proposal(Proposal {
            timestamp,
            nonce,
            next_consensus: next_consensus_address(&next_validators),
            transaction_hashes: transactions.iter().map(|tx| tx.hash()).collect(),
        });
        for tx in transactions {
            self.context.insert_transaction(tx);
        }
    }

    fn make_prepare_request(&self) -> Option<PrepareRequest<L::Transaction>> {
        let proposal = self.context.proposal()?;
        let reward = self
            .context
            .transaction(proposal.transaction_hashes.first()?)?
            .clone();
        let signature = *self.context.signature(self.context.my_index()?)?;
        Some(PrepareRequest {
            view_number: self.context.view_number(),
            nonce: proposal.nonce,
            next_consensus: proposal.next_consensus,
            transaction_hashes: proposal.transaction_hashes.clone(),
            reward_transaction: reward,
            signature,
        })
    }

    /// Admit a proposed transaction.
    ///
    /// A transaction that fails verification or policy triggers a view change
    /// and returns `false`. Once the last one arrives the request is verified
    /// and this node signs.
    pub(super) fn add_transaction(&mut self, tx: L::Transaction, verify: bool) -> bool {
        let hash = tx.hash();
        if verify && !self.ledger.verify(&tx) {
            log::warn!("Invalid transaction {}, requesting view change", hash);
            self.metrics.inc_transactions_rejected();
            self.request_change_view();
            return false;
        }
        if !self.policy.filter_for_mempool(&tx) {
            log::warn!("Transaction {} rejected by policy, requesting view change", hash);
            self.metrics.inc_transactions_rejected();
            self.request_change_view();
            return false;
        }
        self.context.insert_transaction(tx);

        if self.context.has_all_transactions() {
            if self.verify_request() {
                self.send_prepare_response();
            } else {
                log::warn!(
                    "Proposal at height {} view {} failed verification",
                    self.context.block_index(),
                    self.context.view_number()
                );
                self.request_change_view();
                return false;
            }
        }
        true
    }

    /// Whether the completed proposal is the one the primary should have built.
    fn verify_request(&self) -> bool {
        if !self.context.has(StateFlags::REQUEST_RECEIVED) {
            return false;
        }
        let (Some(proposal), Some(transactions)) =
            (self.context.proposal(), self.context.ordered_transactions())
        else {
            return false;
        };

        let next_validators = self
            .ledger
            .validators_for(self.context.block_index().saturating_add(1), &transactions);
        if next_consensus_address(&next_validators) != proposal.next_consensus {
            log::debug!("Proposal next_consensus does not match the validator set");
            return false;
        }

        let Some(reward) = transactions.first().filter(|tx| tx.is_reward()) else {
            return false;
        };
        let others: Vec<L::Transaction> = transactions
            .iter()
            .filter(|tx| !tx.is_reward())
            .cloned()
            .collect();
        let fee = self.ledger.net_fee(&others);
        if reward.output_value() != fee {
            log::debug!(
                "Reward pays {} but the net fee is {}",
                reward.output_value(),
                fee
            );
            return false;
        }
        true
    }

    fn send_prepare_response(&mut self) {
        let (Some(my_index), Some(header)) = (self.context.my_index(), self.context.header()) else {
            return;
        };
        let Some(key_pair) = self.key_pair.as_ref() else {
            return;
        };
        log::info!(
            "Send prepare response: height={} view={}",
            self.context.block_index(),
            self.context.view_number()
        );
        let signature = self.wallet.sign(&header.hash_data(), key_pair);
        self.context.apply(Transition::SignatureSent);
        self.context.set_signature(my_index, signature);
        self.broadcast(
            PrepareResponse {
                view_number: self.context.view_number(),
                signature,
            }
            .into(),
        );
        self.metrics.inc_responses_sent();
        self.check_signatures();
    }
}
