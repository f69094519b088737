// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::types::Role;

/// Bitset describing how far this node has progressed in the current view.
///
/// Bits accumulate monotonically within a view. They are only cleared by the
/// transitions in [`StateFlags::apply`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateFlags(u8);

impl StateFlags {
    /// No bit set.
    pub const INITIAL: StateFlags = StateFlags(0x00);
    /// This node is the primary of the view.
    pub const PRIMARY: StateFlags = StateFlags(0x01);
    /// This node is a backup in the view.
    pub const BACKUP: StateFlags = StateFlags(0x02);
    /// The primary has broadcast its PrepareRequest.
    pub const REQUEST_SENT: StateFlags = StateFlags(0x04);
    /// A backup has accepted the primary's PrepareRequest.
    pub const REQUEST_RECEIVED: StateFlags = StateFlags(0x08);
    /// This node has broadcast a PrepareResponse.
    pub const SIGNATURE_SENT: StateFlags = StateFlags(0x10);
    /// The block for this height has been assembled and relayed.
    pub const BLOCK_SENT: StateFlags = StateFlags(0x20);
    /// This node has asked to move to a later view.
    pub const VIEW_CHANGING: StateFlags = StateFlags(0x40);

    const NAMES: [(StateFlags, &'static str); 7] = [
        (Self::PRIMARY, "Primary"),
        (Self::BACKUP, "Backup"),
        (Self::REQUEST_SENT, "RequestSent"),
        (Self::REQUEST_RECEIVED, "RequestReceived"),
        (Self::SIGNATURE_SENT, "SignatureSent"),
        (Self::BLOCK_SENT, "BlockSent"),
        (Self::VIEW_CHANGING, "ViewChanging"),
    ];

    /// Raw bits.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(&self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: StateFlags) {
        self.0 |= other.0;
    }

    /// Flag for a role; `Role::None` has no bit.
    pub fn for_role(role: Role) -> StateFlags {
        match role {
            Role::None => Self::INITIAL,
            Role::Primary => Self::PRIMARY,
            Role::Backup => Self::BACKUP,
        }
    }

    /// Compute the flag set after `transition`.
    pub fn apply(self, transition: Transition) -> StateFlags {
        match transition {
            Transition::StartHeight(role) => Self::for_role(role),
            Transition::ChangeView(role) => {
                StateFlags(self.0 & Self::SIGNATURE_SENT.0) | Self::for_role(role)
            }
            Transition::RequestSent => self | Self::REQUEST_SENT,
            Transition::RequestReceived => self | Self::REQUEST_RECEIVED,
            Transition::SignatureSent => self | Self::SIGNATURE_SENT,
            Transition::BlockSent => self | Self::BLOCK_SENT,
            Transition::ViewChanging => self | Self::VIEW_CHANGING,
        }
    }
}

impl BitOr for StateFlags {
    type Output = StateFlags;

    fn bitor(self, rhs: StateFlags) -> StateFlags {
        StateFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: StateFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial() {
            return write!(f, "Initial");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFlags({})", self)
    }
}

/// A state change of the round context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// A new height begins: every bit is dropped, the role bit is set.
    StartHeight(Role),

    /// The view moves within the same height: only `SignatureSent` survives,
    /// then the new role bit is set.
    ChangeView(Role),

    /// Primary broadcast its proposal.
    RequestSent,

    /// Backup adopted the primary's proposal.
    RequestReceived,

    /// This node broadcast its PrepareResponse.
    SignatureSent,

    /// The block was assembled and relayed.
    BlockSent,

    /// This node requested a view change.
    ViewChanging,
}
