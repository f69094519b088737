// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Consensus messages and their wire format.
//!
//! Three message kinds share a two-byte envelope (`kind`, `view_number`)
//! followed by a kind-specific body:
//!
//! - **ChangeView**: a validator's request to move to a later view
//! - **PrepareRequest**: the primary's proposal
//! - **PrepareResponse**: a backup's signature over the proposed header
//!
//! Encoded messages travel as the `data` field of a [`ConsensusPayload`], the
//! outer envelope that binds them to a height, a previous block and a sender.

mod codec;
mod message;
mod payload;

pub use message::{ChangeView, ConsensusMessage, MessageKind, PrepareRequest, PrepareResponse};
pub use payload::ConsensusPayload;

pub(crate) use codec::wire_options;
