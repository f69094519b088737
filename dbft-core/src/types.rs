// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Common types used throughout the consensus algorithm

use serde::{Deserialize, Serialize};

/// Height of a block in the chain.
pub type BlockIndex = u32;

/// A view number within one block height.
///
/// Views start at 0 when a height begins and only move forward until a block
/// commits. Each view has a designated primary.
pub type ViewNumber = u8;

/// Index of a validator within the height's validator set.
pub type ValidatorIndex = u16;

/// Protocol version carried in every consensus payload.
pub const PROTOCOL_VERSION: u8 = 0;

/// Version of the block header format produced by this engine.
pub const BLOCK_VERSION: u32 = 0;

/// Maximum number of faulty validators tolerated by a set of `n`.
pub fn max_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Minimum number of agreeing validators (`M`) for a set of `n`.
///
/// `M = N - floor((N - 1) / 3)`.
pub fn quorum(n: usize) -> usize {
    n - max_faulty(n)
}

/// Index of the primary for `view` at `block_index` in a set of `n` validators.
///
/// The primary rotates backwards through the validator list as the view
/// increases. The result is always in `[0, n)`.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn primary_index(block_index: BlockIndex, view: ViewNumber, n: usize) -> usize {
    assert!(n > 0, "validator set must not be empty");
    (i64::from(block_index) - i64::from(view)).rem_euclid(n as i64) as usize
}

/// Role of this node in the current view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Not a validator for this height; observes only.
    None,

    /// Proposer for the current view.
    Primary,

    /// Any validator that is not the primary.
    Backup,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::None => write!(f, "none"),
            Role::Primary => write!(f, "primary"),
            Role::Backup => write!(f, "backup"),
        }
    }
}

/// Kind of inventory announced to peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryKind {
    /// Transactions
    Transaction,
}

impl std::fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InventoryKind::Transaction => write!(f, "tx"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_values() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 3);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(7), 5);
        assert_eq!(quorum(10), 7);
        assert_eq!(quorum(21), 15);
    }

    #[test]
    fn test_quorum_tolerates_max_faulty() {
        for n in 1..=100 {
            let f = max_faulty(n);
            assert_eq!(quorum(n) + f, n);
            // Two quorums always overlap in at least one honest validator.
            assert!(2 * quorum(n) > n + f, "n={}", n);
        }
    }

    #[test]
    fn test_primary_index_in_range() {
        for n in 1..=10usize {
            for block_index in [0u32, 1, 2, 7, 100, u32::MAX] {
                for view in [0u8, 1, 3, 9, 200, 255] {
                    let p = primary_index(block_index, view, n);
                    assert!(p < n);
                }
            }
        }
    }

    #[test]
    fn test_primary_index_periodic_in_view() {
        for n in 1..=7usize {
            for block_index in [0u32, 5, 1000] {
                for view in 0u8..=40 {
                    assert_eq!(
                        primary_index(block_index, view, n),
                        primary_index(block_index, view + n as u8, n)
                    );
                }
            }
        }
    }

    #[test]
    fn test_primary_index_never_negative() {
        // block_index < view would go negative with a plain remainder.
        assert_eq!(primary_index(1, 3, 4), 2);
        assert_eq!(primary_index(0, 1, 4), 3);
        assert_eq!(primary_index(0, 255, 7), 4);
    }

    #[test]
    fn test_primary_rotates_backwards() {
        assert_eq!(primary_index(10, 0, 4), 2);
        assert_eq!(primary_index(10, 1, 4), 1);
        assert_eq!(primary_index(10, 2, 4), 0);
        assert_eq!(primary_index(10, 3, 4), 3);
    }

    #[test]
    #[should_panic]
    fn test_primary_index_empty_set() {
        primary_index(1, 0, 0);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Primary.to_string(), "primary");
        assert_eq!(Role::Backup.to_string(), "backup");
        assert_eq!(Role::None.to_string(), "none");
        assert_eq!(InventoryKind::Transaction.to_string(), "tx");
    }
}
