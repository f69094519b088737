// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Testing utilities for dbft-core.
//!
//! This module provides mock implementations of the collaborator traits and an
//! in-process network, so the engine and the service can be exercised without a
//! real chain, key store or peer-to-peer layer.

mod local_network;
mod memory_ledger;
mod mock_transaction;
mod mock_wallet;

pub use local_network::{LocalNetwork, LocalTransport};
pub use memory_ledger::{AllowAllPolicy, DenyListPolicy, MemoryLedger};
pub use mock_transaction::MockTransaction;
pub use mock_wallet::{make_validators, mock_key_pair, ManualClock, MockKeyPair, MockWallet};
