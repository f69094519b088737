// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use dbft_traits::{Clock, Hash256, PublicKey, Signature, Wallet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Key pair of a mock validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockKeyPair {
    pub public_key: PublicKey,
    pub index: usize,
}

/// Deterministic key pair for validator `index`.
pub fn mock_key_pair(index: usize) -> MockKeyPair {
    let mut seed = b"dbft-mock-validator".to_vec();
    seed.extend_from_slice(&(index as u64).to_le_bytes());
    MockKeyPair {
        public_key: PublicKey(Hash256::digest(&seed).0),
        index,
    }
}

/// Public keys of validators `0..n`.
pub fn make_validators(n: usize) -> Vec<PublicKey> {
    (0..n).map(|i| mock_key_pair(i).public_key).collect()
}

/// A mock wallet holding some of the mock validator keys.
///
/// Signatures are keyed hashes of the message under the public key, so they
/// bind message and signer but are not secret. Good enough to exercise every
/// verification path; never use outside tests.
#[derive(Clone, Debug, Default)]
pub struct MockWallet {
    keys: Vec<MockKeyPair>,
}

impl MockWallet {
    /// A wallet holding the keys of validators `0..n`.
    pub fn new(n: usize) -> Self {
        Self::with_indices(0..n)
    }

    /// A wallet holding the key of validator `index` only.
    pub fn validator(index: usize) -> Self {
        Self::with_indices([index])
    }

    /// A wallet holding no validator key.
    pub fn observer() -> Self {
        Self::default()
    }

    pub fn with_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            keys: indices.into_iter().map(mock_key_pair).collect(),
        }
    }

    /// Public keys held, in the order they were added.
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|k| k.public_key).collect()
    }

    fn signature_for(message: &[u8], key: &PublicKey) -> Signature {
        let mut first = key.as_bytes().to_vec();
        first.extend_from_slice(message);
        let head = Hash256::digest(&first);

        let mut second = head.as_bytes().to_vec();
        second.extend_from_slice(key.as_bytes());
        let tail = Hash256::digest(&second);

        let mut out = [0u8; 64];
        out[..32].copy_from_slice(head.as_bytes());
        out[32..].copy_from_slice(tail.as_bytes());
        Signature(out)
    }
}

impl Wallet for MockWallet {
    type KeyPair = MockKeyPair;

    fn account_for(&self, key: &PublicKey) -> Option<MockKeyPair> {
        self.keys.iter().find(|k| k.public_key == *key).cloned()
    }

    fn sign(&self, message: &[u8], key_pair: &MockKeyPair) -> Signature {
        Self::signature_for(message, &key_pair.public_key)
    }

    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool {
        Self::signature_for(message, key) == *signature
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
