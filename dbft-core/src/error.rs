// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Error types for the consensus crate.
//!
//! These errors never leave the engine's message handlers: a payload that fails
//! to decode is dropped and logged. They are public so that the codec and the
//! configuration loader can be used on their own.

use dbft_traits::Hash256;
use thiserror::Error;

/// Failure to decode a consensus message or payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message was empty or shorter than its envelope
    #[error("Message truncated: {0} bytes")]
    Truncated(usize),

    /// The kind tag is not one of the known message types
    #[error("Unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    /// ChangeView to view 0 is meaningless
    #[error("ChangeView to view 0")]
    ZeroViewChange,

    /// A PrepareRequest without any transaction hash
    #[error("PrepareRequest carries no transaction hashes")]
    EmptyProposal,

    /// A PrepareRequest listing a hash twice
    #[error("Duplicate transaction hash {0}")]
    DuplicateTransactionHash(Hash256),

    /// The reward transaction is not the first listed hash
    #[error("Reward transaction hash {actual} does not match first proposal hash {expected}")]
    RewardHashMismatch {
        expected: Hash256,
        actual: Hash256,
    },

    /// Binary encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for the expected schema
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a new invalid configuration error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
