// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # dBFT Consensus Core Library
//!
//! This library provides a delegated Byzantine fault tolerant consensus engine
//! in which a fixed, ordered validator set agrees on one block per height.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`state`] - Round context and state flags for one height
//! - [`messages`] - Consensus messages and the signed payload envelope
//! - [`engine`] - The protocol state machine
//! - [`liveness`] - Timeout schedule and the consensus timer
//! - [`service`] - Async event loop driving the engine
//! - [`types`] - Common consensus types (BlockIndex, ViewNumber, etc.)
//!
//! ## Usage
//!
//! The library is designed to be used through trait implementations. Users must:
//!
//! 1. Implement the traits from `dbft-traits` for their chain, wallet and transactions
//! 2. Provide a [`network::Transport`] for outbound messages
//! 3. Run a [`service::ConsensusService`] and feed it through its handle
//!
//! ```rust,no_run,ignore
//! use dbft_core::{ConsensusConfig, ConsensusEngine, ConsensusService};
//!
//! let engine = ConsensusEngine::new(ledger, policy, wallet, clock, ConsensusConfig::default());
//! let (service, handle) = ConsensusService::new(engine, transport);
//! tokio::spawn(service.run());
//! handle.start()?;
//! ```

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod messages;
pub mod metrics;
pub mod network;
pub mod service;
pub mod state;
pub mod testing;
pub mod types;

// Re-export commonly used types
pub use block::{Block, BlockHeader, Witness};
pub use config::ConsensusConfig;
pub use engine::{ConsensusAction, ConsensusEngine};
pub use error::{CodecError, ConfigError};
pub use messages::{ConsensusMessage, ConsensusPayload};
pub use metrics::{ConsensusMetrics, MetricsSnapshot};
pub use network::{IgnoreReason, ProcessResult, Transport};
pub use service::{ConsensusEvent, ConsensusHandle, ConsensusService};
pub use state::{RoundContext, StateFlags};
pub use types::{BlockIndex, Role, ValidatorIndex, ViewNumber};

/// Error type for collaborator operations
pub use dbft_traits::Error;

/// Version of the dBFT protocol implemented by this library
pub const DBFT_VERSION: &str = "0.1.0";
