// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Key management and time sources.

use crate::core::{PublicKey, Signature};
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// Signing keys held by this node.
///
/// The engine looks up which validator slot (if any) the node controls with
/// [`Wallet::account_for`], then signs headers and payloads with that key pair.
/// Verification of other validators' signatures goes through the same trait so
/// that the signature scheme stays entirely on the wallet side.
pub trait Wallet: Send + Sync {
    /// Private key material for one account.
    type KeyPair: Clone + Debug + Send + Sync;

    /// Key pair for `key`, if this wallet holds its private half.
    fn account_for(&self, key: &PublicKey) -> Option<Self::KeyPair>;

    /// Sign `message` with `key_pair`.
    fn sign(&self, message: &[u8], key_pair: &Self::KeyPair) -> Signature;

    /// Check `signature` over `message` against `key`.
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool;
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Seconds since the Unix epoch, as carried in block timestamps.
    fn now_secs(&self) -> u32 {
        (self.now_millis() / 1000) as u32
    }
}

/// [`Clock`] backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
