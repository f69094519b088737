// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Primitive value types shared by the consensus engine and its collaborators.
//!
//! Hashes are fixed-size byte arrays derived with blake3. Keys and signatures are
//! opaque to the engine: it only moves them around and hands them back to the
//! [`Wallet`](crate::Wallet) for signing and verification.

use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;

/// Error type for collaborator operations.
pub type Error = anyhow::Error;

/// Asset amount in the smallest indivisible unit.
pub type Amount = u64;

macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Length of the encoded value in bytes.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Create a value from a byte slice.
            ///
            /// # Errors
            ///
            /// Returns an error if the slice has the wrong length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.len() != $len {
                    anyhow::bail!(
                        "invalid {} length: expected {}, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    );
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

/// 256-bit hash identifying blocks and transactions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

fixed_bytes!(Hash256, 32);

impl Hash256 {
    /// Hash arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

/// 160-bit script hash identifying accounts and multi-signature contracts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash160(pub [u8; 20]);

fixed_bytes!(Hash160, 20);

impl Hash160 {
    /// Hash arbitrary bytes, keeping the first 20 bytes of the 256-bit digest.
    pub fn digest(data: &[u8]) -> Self {
        let full = blake3::hash(data);
        let mut out = [0u8; 20];
        out.copy_from_slice(&full.as_bytes()[..20]);
        Self(out)
    }
}

/// A validator's public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

fixed_bytes!(PublicKey, 32);

impl PublicKey {
    /// Address of the single-signature account controlled by this key.
    pub fn script_hash(&self) -> Hash160 {
        Hash160::digest(&self.0)
    }
}

/// A 64-byte signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

fixed_bytes!(Signature, 64);

// Arrays longer than 32 have no serde impls; encode as a fixed tuple so
// binary formats write exactly 64 bytes with no length prefix.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(Self::LEN)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} bytes", Signature::LEN)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Signature, A::Error> {
                let mut out = [0u8; 64];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Signature(out))
            }
        }

        deserializer.deserialize_tuple(Self::LEN, SignatureVisitor)
    }
}
