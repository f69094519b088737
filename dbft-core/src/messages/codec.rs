// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use bincode::Options;

/// Binary encoding shared by every consensus message body and payload.
///
/// Fixed-width little-endian integers, `u64` length prefixes, trailing bytes
/// rejected, and every allocation bounded by `limit`.
pub(crate) fn wire_options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(limit)
        .with_little_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}
