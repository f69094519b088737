// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # dBFT Consensus Traits
//!
//! This library provides the primitive types and collaborator interfaces used by the
//! delegated BFT consensus engine in `dbft-core`.
//!
//! ## Overview
//!
//! The engine agrees, once per block height, on an ordered set of transactions and a
//! single signed header. It does not store the chain, hold keys or execute
//! transactions; those responsibilities sit behind the traits in this crate and are
//! injected when the engine is constructed.
//!
//! ## Core Items
//!
//! - **Primitives**: [`Hash256`], [`Hash160`], [`PublicKey`], [`Signature`], [`Amount`]
//! - **Transactions**: [`Transaction`]
//! - **Chain access**: [`Ledger`], [`Policy`]
//! - **Keys and time**: [`Wallet`], [`Clock`], [`SystemClock`]
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0 (LICENSE or http://www.apache.org/licenses/LICENSE-2.0)

pub mod core;
pub mod ledger;
pub mod transaction;
pub mod wallet;

pub use crate::core::{Amount, Error, Hash160, Hash256, PublicKey, Signature};
pub use ledger::{Ledger, Policy};
pub use transaction::Transaction;
pub use wallet::{Clock, SystemClock, Wallet};

/// Result type alias for collaborator operations.
pub type Result<T> = std::result::Result<T, crate::core::Error>;
