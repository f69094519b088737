// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Transaction trait for consensus.
//!
//! The engine never interprets transactions beyond what this trait exposes. It
//! needs a stable hash, the ability to recognise and build the reward transaction
//! that opens every block, and the reward's total output value for request
//! verification.

use crate::core::{Amount, Hash160, Hash256};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Generic transaction type.
///
/// # Requirements
///
/// Implementations must be:
/// - Thread-safe (Send + Sync)
/// - Serializable, since the reward transaction travels inside the proposal
/// - Hashed deterministically: two nodes must compute the same hash for the same value
///
/// # Example
///
/// ```text
/// use dbft_traits::{Amount, Hash160, Hash256, Transaction};
///
/// #[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// struct MyTransaction {
///     nonce: u64,
///     outputs: Vec<(Hash160, Amount)>,
/// }
///
/// impl Transaction for MyTransaction {
///     fn hash(&self) -> Hash256 {
///         Hash256::digest(&bincode::serialize(self).unwrap())
///     }
///     // ...
/// }
/// ```
pub trait Transaction: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Compute the hash of this transaction.
    fn hash(&self) -> Hash256;

    /// Whether this is a reward (miner) transaction.
    fn is_reward(&self) -> bool;

    /// Sum of all output values.
    fn output_value(&self) -> Amount;

    /// Build a reward transaction paying `fee` to `recipient`.
    ///
    /// With a zero fee (or no recipient) the transaction has no outputs. The nonce
    /// only exists to make the hash unique.
    fn new_reward(nonce: u64, fee: Amount, recipient: Option<Hash160>) -> Self;
}
