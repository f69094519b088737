// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use bincode::Options;
use dbft_traits::{Hash256, PublicKey, Signature, Transaction, Wallet};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::messages::codec::wire_options;
use crate::messages::ConsensusMessage;
use crate::types::{BlockIndex, ValidatorIndex};

/// Network envelope around one encoded consensus message.
///
/// The envelope binds the message to a height, a previous block and a sender.
/// `witness` is the sender's signature over [`ConsensusPayload::unsigned_data`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusPayload {
    pub version: u8,
    pub prev_hash: Hash256,
    pub block_index: BlockIndex,
    pub validator_index: ValidatorIndex,
    pub timestamp: u32,
    pub data: Vec<u8>,
    pub witness: Signature,
}

impl ConsensusPayload {
    /// Bytes covered by the witness: every field except the witness itself.
    pub fn unsigned_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 4 + 2 + 4 + 8 + self.data.len());
        out.push(self.version);
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(&self.block_index.to_le_bytes());
        out.extend_from_slice(&self.validator_index.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Inventory hash of the payload.
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.unsigned_data())
    }

    /// Set the witness by signing with `key_pair`.
    pub fn sign<W: Wallet>(&mut self, wallet: &W, key_pair: &W::KeyPair) {
        self.witness = wallet.sign(&self.unsigned_data(), key_pair);
    }

    /// Check the witness against the sender's key.
    pub fn verify_witness<W: Wallet>(&self, wallet: &W, sender: &PublicKey) -> bool {
        wallet.verify(&self.unsigned_data(), &self.witness, sender)
    }

    /// Decode the carried message.
    pub fn message<T: Transaction>(&self, limit: u64) -> Result<ConsensusMessage<T>, CodecError> {
        ConsensusMessage::decode(&self.data, limit)
    }

    pub fn to_bytes(&self, limit: u64) -> Result<Vec<u8>, CodecError> {
        Ok(wire_options(limit).serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8], limit: u64) -> Result<Self, CodecError> {
        Ok(wire_options(limit).deserialize(bytes)?)
    }
}
