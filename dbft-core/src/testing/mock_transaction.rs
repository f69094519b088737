// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use dbft_traits::{Amount, Hash160, Hash256, Transaction};
use serde::{Deserialize, Serialize};

/// A mock transaction for testing.
///
/// Ordinary transactions are identified by `id` and pay `fee`. Reward
/// transactions carry their nonce in `id` and pay out through `outputs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MockTransaction {
    /// Identifier, or nonce for a reward transaction
    pub id: u64,

    /// Network fee paid by this transaction
    pub fee: Amount,

    /// Whether this is a reward transaction
    pub reward: bool,

    /// Payments made by this transaction
    pub outputs: Vec<(Hash160, Amount)>,
}

impl MockTransaction {
    /// Create an ordinary transaction.
    pub fn new(id: u64, fee: Amount) -> Self {
        Self {
            id,
            fee,
            reward: false,
            outputs: Vec::new(),
        }
    }

    /// Create a reward transaction paying `amount` to the zero address.
    pub fn reward(nonce: u64, amount: Amount) -> Self {
        Self::new_reward(nonce, amount, Some(Hash160::zero()))
    }
}

impl Transaction for MockTransaction {
    fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(1 + 8 + 8 + 8 + self.outputs.len() * 28);
        data.push(self.reward as u8);
        data.extend_from_slice(&self.id.to_le_bytes());
        data.extend_from_slice(&self.fee.to_le_bytes());
        data.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for (recipient, amount) in &self.outputs {
            data.extend_from_slice(recipient.as_bytes());
            data.extend_from_slice(&amount.to_le_bytes());
        }
        Hash256::digest(&data)
    }

    fn is_reward(&self) -> bool {
        self.reward
    }

    fn output_value(&self) -> Amount {
        self.outputs.iter().map(|(_, amount)| *amount).sum()
    }

    fn new_reward(nonce: u64, fee: Amount, recipient: Option<Hash160>) -> Self {
        let outputs = match recipient {
            Some(recipient) if fee > 0 => vec![(recipient, fee)],
            _ => Vec::new(),
        };
        Self {
            id: nonce,
            fee: 0,
            reward: true,
            outputs,
        }
    }
}
