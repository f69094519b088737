// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Block header and block assembly.
//!
//! The header is what validators sign: each PrepareResponse carries one
//! signature over [`BlockHeader::hash_data`]. Once `M` of them are collected
//! the header, the ordered transactions and a multi-signature [`Witness`] form
//! the final [`Block`].

use dbft_traits::{Hash160, Hash256, PublicKey, Signature, Transaction, Wallet};
use serde::{Deserialize, Serialize};

use crate::types::{quorum, BlockIndex, ValidatorIndex};

/// Unsigned block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header format version
    pub version: u32,

    /// Hash of the previous block
    pub prev_hash: Hash256,

    /// Merkle root over the ordered transaction hashes
    pub merkle_root: Hash256,

    /// Seconds since the Unix epoch
    pub timestamp: u32,

    /// Height of this block
    pub index: BlockIndex,

    /// Proposal nonce
    pub nonce: u64,

    /// Multi-signature address of the validators for the next height
    pub next_consensus: Hash160,
}

impl BlockHeader {
    /// Bytes covered by validator signatures.
    pub fn hash_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 32 + 32 + 4 + 4 + 8 + 20);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(self.next_consensus.as_bytes());
        out
    }

    /// Block hash.
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.hash_data())
    }
}

/// Merkle root over an ordered list of hashes.
///
/// A single leaf is its own root; an odd node at any level is paired with
/// itself. The empty list has the zero root.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return Hash256::zero();
    }
    let mut level: Vec<Hash256> = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(left.as_bytes());
                buf[32..].copy_from_slice(right.as_bytes());
                Hash256::digest(&buf)
            })
            .collect();
    }
    level[0]
}

/// Address of the `M`-of-`N` multi-signature account for `validators`.
///
/// Keys are sorted first, so the address does not depend on validator order.
pub fn next_consensus_address(validators: &[PublicKey]) -> Hash160 {
    let mut keys = validators.to_vec();
    keys.sort();
    let mut data = Vec::with_capacity(1 + keys.len() * PublicKey::LEN);
    data.push(quorum(keys.len()) as u8);
    for key in &keys {
        data.extend_from_slice(key.as_bytes());
    }
    Hash160::digest(&data)
}

/// Multi-signature witness proving `m` validators signed the header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Required signature count
    pub m: u16,

    /// Validator set of the height, in index order
    pub validators: Vec<PublicKey>,

    /// `(validator index, signature)`, ascending by index
    pub signatures: Vec<(ValidatorIndex, Signature)>,
}

impl Witness {
    /// Build a witness from a signature table indexed by validator.
    ///
    /// Takes the first `m` present signatures in ascending index order, so the
    /// result does not depend on the order in which signatures arrived.
    pub fn from_signatures(validators: &[PublicKey], signatures: &[Option<Signature>]) -> Self {
        let m = quorum(validators.len());
        let signatures = signatures
            .iter()
            .enumerate()
            .filter_map(|(i, sig)| sig.map(|sig| (i as ValidatorIndex, sig)))
            .take(m)
            .collect();
        Self {
            m: m as u16,
            validators: validators.to_vec(),
            signatures,
        }
    }

    /// Address of the multi-signature account this witness satisfies.
    pub fn script_hash(&self) -> Hash160 {
        next_consensus_address(&self.validators)
    }
}

/// A fully signed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "T: Transaction")]
pub struct Block<T: Transaction> {
    /// Signed header
    pub header: BlockHeader,

    /// Transactions in proposal order; index 0 is the reward transaction
    pub transactions: Vec<T>,

    /// Validator signatures over the header
    pub witness: Witness,
}

impl<T: Transaction> Block<T> {
    /// Block hash.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Height of this block.
    pub fn index(&self) -> BlockIndex {
        self.header.index
    }

    /// Check that the witness carries `m` distinct valid signatures and that the
    /// transactions match the header's merkle root.
    pub fn verify<W: Wallet>(&self, wallet: &W) -> bool {
        let witness = &self.witness;
        if witness.m as usize != quorum(witness.validators.len())
            || witness.signatures.len() < witness.m as usize
        {
            return false;
        }
        if !witness
            .signatures
            .windows(2)
            .all(|pair| pair[0].0 < pair[1].0)
        {
            return false;
        }
        let hashes: Vec<Hash256> = self.transactions.iter().map(|tx| tx.hash()).collect();
        if merkle_root(&hashes) != self.header.merkle_root {
            return false;
        }
        let data = self.header.hash_data();
        witness.signatures.iter().all(|(index, sig)| {
            witness
                .validators
                .get(*index as usize)
                .map(|key| wallet.verify(&data, sig, key))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            version: 0,
            prev_hash: Hash256::digest(b"prev"),
            merkle_root: Hash256::digest(b"root"),
            timestamp: 1_700_000_000,
            index: 42,
            nonce: 7,
            next_consensus: Hash160::digest(b"next"),
        }
    }

    #[test]
    fn test_hash_data_layout() {
        assert_eq!(header().hash_data().len(), 4 + 32 + 32 + 4 + 4 + 8 + 20);
    }

    #[test]
    fn test_header_hash_covers_every_field() {
        let base = header();
        let mut other = base.clone();
        other.nonce += 1;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.next_consensus = Hash160::zero();
        assert_ne!(base.hash(), other.hash());
    }

    #[test]
    fn test_merkle_root_single_and_empty() {
        let a = Hash256::digest(b"a");
        assert_eq!(merkle_root(&[a]), a);
        assert_eq!(merkle_root(&[]), Hash256::zero());
    }

    #[test]
    fn test_merkle_root_order_matters() {
        let a = Hash256::digest(b"a");
        let b = Hash256::digest(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let a = Hash256::digest(b"a");
        let b = Hash256::digest(b"b");
        let c = Hash256::digest(b"c");
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
    }

    #[test]
    fn test_next_consensus_address_ignores_order() {
        let keys: Vec<PublicKey> = (1..=4u8).map(|i| PublicKey([i; 32])).collect();
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_eq!(next_consensus_address(&keys), next_consensus_address(&reversed));
        assert_ne!(next_consensus_address(&keys), next_consensus_address(&keys[..3]));
    }

    #[test]
    fn test_witness_takes_first_m_by_index() {
        let keys: Vec<PublicKey> = (0..4u8).map(|i| PublicKey([i; 32])).collect();
        let sigs = vec![
            None,
            Some(Signature([1; 64])),
            Some(Signature([2; 64])),
            Some(Signature([3; 64])),
        ];
        let witness = Witness::from_signatures(&keys, &sigs);
        assert_eq!(witness.m, 3);
        let indices: Vec<u16> = witness.signatures.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let all = vec![Some(Signature([9; 64])); 4];
        let witness = Witness::from_signatures(&keys, &all);
        let indices: Vec<u16> = witness.signatures.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
