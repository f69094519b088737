// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Inbound payload admission and per-message handlers.

use dbft_traits::{Ledger, Policy, Wallet};

use super::{ConsensusAction, ConsensusEngine};
use crate::messages::{
    ChangeView, ConsensusMessage, ConsensusPayload, PrepareRequest, PrepareResponse,
};
use crate::network::{IgnoreReason, ProcessResult};
use crate::state::{Proposal, StateFlags, Transition};
use crate::types::PROTOCOL_VERSION;

impl<L, P, W> ConsensusEngine<L, P, W>
where
    L: Ledger,
    P: Policy<L::Transaction>,
    W: Wallet,
{
    /// Handle an encoded payload from the network.
    pub fn on_payload_bytes(&mut self, bytes: &[u8]) -> ProcessResult {
        match ConsensusPayload::from_bytes(bytes, self.config.max_message_size) {
            Ok(payload) => self.on_payload(&payload),
            Err(e) => {
                log::debug!("Dropping undecodable payload: {}", e);
                self.metrics.inc_payloads_ignored();
                ProcessResult::ignored(IgnoreReason::Malformed)
            }
        }
    }

    /// Handle a payload from the network.
    pub fn on_payload(&mut self, payload: &ConsensusPayload) -> ProcessResult {
        let result = self.process_payload(payload);
        if let ProcessResult::Ignored(reason) = result {
            log::debug!(
                "Ignored payload from validator {} at height {}: {}",
                payload.validator_index,
                payload.block_index,
                reason
            );
            self.metrics.inc_payloads_ignored();
        }
        result
    }

    fn process_payload(&mut self, payload: &ConsensusPayload) -> ProcessResult {
        if !self.started {
            return ProcessResult::ignored(IgnoreReason::NotStarted);
        }
        if self.context.has(StateFlags::BLOCK_SENT) {
            return ProcessResult::ignored(IgnoreReason::BlockSent);
        }
        let sender = payload.validator_index as usize;
        if self.context.my_index() == Some(sender) {
            return ProcessResult::ignored(IgnoreReason::OwnPayload);
        }
        if payload.version != PROTOCOL_VERSION {
            return ProcessResult::ignored(IgnoreReason::VersionMismatch);
        }
        if payload.prev_hash != self.context.prev_hash()
            || payload.block_index != self.context.block_index()
        {
            if self.context.block_index() < payload.block_index {
                log::warn!(
                    "Chain sync: expected={} current={} validator={}",
                    payload.block_index,
                    self.context.block_index().saturating_sub(1),
                    payload.validator_index
                );
            }
            return ProcessResult::ignored(IgnoreReason::WrongHeight);
        }
        let Some(sender_key) = self.context.validators().get(sender).copied() else {
            return ProcessResult::ignored(IgnoreReason::UnknownValidator);
        };
        if !payload.verify_witness(self.wallet.as_ref(), &sender_key) {
            return ProcessResult::ignored(IgnoreReason::InvalidWitness);
        }
        let message = match payload.message::<L::Transaction>(self.config.max_message_size) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("Malformed message from validator {}: {}", sender, e);
                return ProcessResult::ignored(IgnoreReason::Malformed);
            }
        };
        if message.view_number() != self.context.view_number()
            && !matches!(message, ConsensusMessage::ChangeView(_))
        {
            return ProcessResult::ignored(IgnoreReason::WrongView);
        }

        match message {
            ConsensusMessage::ChangeView(m) => self.on_change_view(sender, m),
            ConsensusMessage::PrepareRequest(m) => self.on_prepare_request(payload, m),
            ConsensusMessage::PrepareResponse(m) => self.on_prepare_response(sender, m),
        }
    }

    fn on_change_view(&mut self, sender: usize, message: ChangeView) -> ProcessResult {
        if message.new_view_number <= self.context.expected_view(sender) {
            return ProcessResult::ignored(IgnoreReason::StaleViewChange);
        }
        log::info!(
            "Change view received: height={} view={} index={} nv={}",
            self.context.block_index(),
            message.view_number,
            sender,
            message.new_view_number
        );
        self.context.set_expected_view(sender, message.new_view_number);
        self.check_expected_view(message.new_view_number);
        ProcessResult::Accepted
    }

    fn on_prepare_request(
        &mut self,
        payload: &ConsensusPayload,
        message: PrepareRequest<L::Transaction>,
    ) -> ProcessResult {
        let sender = payload.validator_index as usize;
        if self.context.has(StateFlags::REQUEST_RECEIVED) {
            return ProcessResult::ignored(IgnoreReason::AlreadyReceived);
        }
        if sender != self.context.primary_index() {
            return ProcessResult::ignored(IgnoreReason::NotPrimary);
        }
        if !self.context.has(StateFlags::BACKUP) {
            return ProcessResult::ignored(IgnoreReason::NotBackup);
        }
        log::info!(
            "Prepare request received: height={} view={} index={} tx={}",
            payload.block_index,
            message.view_number,
            sender,
            message.transaction_hashes.len()
        );

        let latest = self
            .clock
            .now_secs()
            .saturating_add(self.config.max_future_timestamp_secs);
        if payload.timestamp <= self.context.prev_timestamp() || payload.timestamp > latest {
            log::warn!("Proposal timestamp {} out of range", payload.timestamp);
            return ProcessResult::ignored(IgnoreReason::InvalidTimestamp);
        }
        if let Some(known) = message
            .transaction_hashes
            .iter()
            .find(|h| self.ledger.contains_transaction(h))
        {
            log::warn!("Proposal includes already persisted transaction {}", known);
            return ProcessResult::ignored(IgnoreReason::KnownTransaction);
        }

        let proposal = Proposal {
            timestamp: payload.timestamp,
            nonce: message.nonce,
            next_consensus: message.next_consensus,
            transaction_hashes: message.transaction_hashes,
        };
        let hash_data = self.context.header_for(&proposal).hash_data();
        let primary_key = self.context.validators()[sender];
        if !self.wallet.verify(&hash_data, &message.signature, &primary_key) {
            log::warn!("Prepare request from validator {} has an invalid signature", sender);
            return ProcessResult::ignored(IgnoreReason::InvalidSignature);
        }

        self.context.apply(Transition::RequestReceived);
        self.context.set_proposal(proposal);
        let wallet = self.wallet.as_ref();
        let cleared = self
            .context
            .retain_signatures(|sig, key| wallet.verify(&hash_data, sig, key));
        if !cleared.is_empty() {
            log::debug!("Cleared signatures for a superseded header: {:?}", cleared);
        }
        self.context.set_signature(sender, message.signature);
        self.metrics.inc_proposals_accepted();

        self.collect_transactions(message.reward_transaction);
        ProcessResult::Accepted
    }

    /// Resolve every proposed transaction, stopping at the first rejection.
    fn collect_transactions(&mut self, reward: L::Transaction) {
        let hashes: Vec<_> = self
            .context
            .transaction_hashes()
            .map(|h| h.iter().skip(1).copied().collect())
            .unwrap_or_default();

        let mut unverified = Vec::new();
        for hash in &hashes {
            if let Some(tx) = self.ledger.mempool_transaction(hash) {
                if !self.add_transaction(tx, false) {
                    return;
                }
            } else if let Some(tx) = self.ledger.unverified_transaction(hash) {
                unverified.push(tx);
            }
        }
        for tx in unverified {
            if !self.add_transaction(tx, true) {
                return;
            }
        }
        if !self.add_transaction(reward, true) {
            return;
        }

        let missing = self.context.missing_transactions();
        if !missing.is_empty() {
            log::info!("Requesting {} missing transactions", missing.len());
            self.actions.push(ConsensusAction::RequestTransactions(missing));
        }
    }

    fn on_prepare_response(&mut self, sender: usize, message: PrepareResponse) -> ProcessResult {
        if self.context.signature(sender).is_some() {
            return ProcessResult::ignored(IgnoreReason::DuplicateSignature);
        }
        log::info!(
            "Prepare response received: height={} view={} index={}",
            self.context.block_index(),
            message.view_number,
            sender
        );
        match self.context.header() {
            // Kept unverified until a proposal arrives to check it against.
            None => {
                self.context.set_signature(sender, message.signature);
                ProcessResult::Accepted
            }
            Some(header) => {
                let key = self.context.validators()[sender];
                if !self.wallet.verify(&header.hash_data(), &message.signature, &key) {
                    return ProcessResult::ignored(IgnoreReason::InvalidSignature);
                }
                self.context.set_signature(sender, message.signature);
                self.metrics.inc_signatures_received();
                self.check_signatures();
                ProcessResult::Accepted
            }
        }
    }
}
