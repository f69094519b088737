// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Round context and state flags.
//!
//! [`RoundContext`] holds everything the engine knows about the height it is
//! working on. [`StateFlags`] tracks progress within the current view and only
//! changes through the [`Transition`]s it defines.

mod flags;
mod round_context;

pub use flags::{StateFlags, Transition};
pub use round_context::{Proposal, RoundContext};
