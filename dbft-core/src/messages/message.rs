// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use bincode::Options;
use dbft_traits::{Hash160, Hash256, Signature, Transaction};
use std::collections::HashSet;
use std::fmt;

use crate::error::CodecError;
use crate::messages::codec::wire_options;
use crate::types::ViewNumber;

/// Kind tag in the first byte of every message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    ChangeView = 0x00,
    PrepareRequest = 0x20,
    PrepareResponse = 0x21,
}

impl TryFrom<u8> for MessageKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(MessageKind::ChangeView),
            0x20 => Ok(MessageKind::PrepareRequest),
            0x21 => Ok(MessageKind::PrepareResponse),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::ChangeView => write!(f, "ChangeView"),
            MessageKind::PrepareRequest => write!(f, "PrepareRequest"),
            MessageKind::PrepareResponse => write!(f, "PrepareResponse"),
        }
    }
}

/// Request to move to a later view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeView {
    /// View the sender was in when it asked
    pub view_number: ViewNumber,

    /// View the sender wants to move to; never 0
    pub new_view_number: ViewNumber,
}

/// The primary's block proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrepareRequest<T> {
    pub view_number: ViewNumber,
    pub nonce: u64,
    pub next_consensus: Hash160,

    /// Ordered, duplicate-free; index 0 is the reward transaction
    pub transaction_hashes: Vec<Hash256>,

    pub reward_transaction: T,

    /// Primary's signature over the proposed header
    pub signature: Signature,
}

/// A backup's signature over the proposed header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrepareResponse {
    pub view_number: ViewNumber,
    pub signature: Signature,
}

/// A decoded consensus message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusMessage<T> {
    ChangeView(ChangeView),
    PrepareRequest(PrepareRequest<T>),
    PrepareResponse(PrepareResponse),
}

impl<T: Transaction> ConsensusMessage<T> {
    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::ChangeView(_) => MessageKind::ChangeView,
            ConsensusMessage::PrepareRequest(_) => MessageKind::PrepareRequest,
            ConsensusMessage::PrepareResponse(_) => MessageKind::PrepareResponse,
        }
    }

    /// View number from the envelope.
    pub fn view_number(&self) -> ViewNumber {
        match self {
            ConsensusMessage::ChangeView(m) => m.view_number,
            ConsensusMessage::PrepareRequest(m) => m.view_number,
            ConsensusMessage::PrepareResponse(m) => m.view_number,
        }
    }

    /// Encode as `[kind][view_number]` followed by the kind body.
    pub fn encode(&self, limit: u64) -> Result<Vec<u8>, CodecError> {
        let options = wire_options(limit);
        let mut out = vec![self.kind() as u8, self.view_number()];
        let body = match self {
            ConsensusMessage::ChangeView(m) => options.serialize(&m.new_view_number)?,
            ConsensusMessage::PrepareRequest(m) => options.serialize(&(
                &m.nonce,
                &m.next_consensus,
                &m.transaction_hashes,
                &m.reward_transaction,
                &m.signature,
            ))?,
            ConsensusMessage::PrepareResponse(m) => options.serialize(&m.signature)?,
        };
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode and validate a message.
    ///
    /// Fails on an unknown kind, a ChangeView to view 0, and a PrepareRequest
    /// that lists no hash, lists a hash twice, or whose reward transaction does
    /// not hash to the first listed hash.
    pub fn decode(bytes: &[u8], limit: u64) -> Result<Self, CodecError> {
        if bytes.len() < 2 {
            return Err(CodecError::Truncated(bytes.len()));
        }
        let kind = MessageKind::try_from(bytes[0])?;
        let view_number = bytes[1];
        let body = &bytes[2..];
        let options = wire_options(limit);

        match kind {
            MessageKind::ChangeView => {
                let new_view_number: ViewNumber = options.deserialize(body)?;
                if new_view_number == 0 {
                    return Err(CodecError::ZeroViewChange);
                }
                Ok(ConsensusMessage::ChangeView(ChangeView {
                    view_number,
                    new_view_number,
                }))
            }
            MessageKind::PrepareRequest => {
                let (nonce, next_consensus, transaction_hashes, reward_transaction, signature): (
                    u64,
                    Hash160,
                    Vec<Hash256>,
                    T,
                    Signature,
                ) = options.deserialize(body)?;

                let first = *transaction_hashes.first().ok_or(CodecError::EmptyProposal)?;
                let mut seen = HashSet::with_capacity(transaction_hashes.len());
                for hash in &transaction_hashes {
                    if !seen.insert(*hash) {
                        return Err(CodecError::DuplicateTransactionHash(*hash));
                    }
                }
                let actual = reward_transaction.hash();
                if actual != first {
                    return Err(CodecError::RewardHashMismatch {
                        expected: first,
                        actual,
                    });
                }

                Ok(ConsensusMessage::PrepareRequest(PrepareRequest {
                    view_number,
                    nonce,
                    next_consensus,
                    transaction_hashes,
                    reward_transaction,
                    signature,
                }))
            }
            MessageKind::PrepareResponse => {
                let signature: Signature = options.deserialize(body)?;
                Ok(ConsensusMessage::PrepareResponse(PrepareResponse {
                    view_number,
                    signature,
                }))
            }
        }
    }
}

impl<T> From<ChangeView> for ConsensusMessage<T> {
    fn from(m: ChangeView) -> Self {
        ConsensusMessage::ChangeView(m)
    }
}

impl<T> From<PrepareRequest<T>> for ConsensusMessage<T> {
    fn from(m: PrepareRequest<T>) -> Self {
        ConsensusMessage::PrepareRequest(m)
    }
}

impl<T> From<PrepareResponse> for ConsensusMessage<T> {
    fn from(m: PrepareResponse) -> Self {
        ConsensusMessage::PrepareResponse(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransaction;

    const LIMIT: u64 = 1 << 20;

    type Message = ConsensusMessage<MockTransaction>;

    fn request() -> PrepareRequest<MockTransaction> {
        let reward = MockTransaction::reward(77, 10);
        PrepareRequest {
            view_number: 2,
            nonce: 77,
            next_consensus: Hash160::digest(b"next"),
            transaction_hashes: vec![reward.hash(), MockTransaction::new(1, 10).hash()],
            reward_transaction: reward,
            signature: Signature([3; 64]),
        }
    }

    #[test]
    fn test_envelope_bytes() {
        let msg: Message = ChangeView {
            view_number: 4,
            new_view_number: 5,
        }
        .into();
        assert_eq!(msg.encode(LIMIT).unwrap(), vec![0x00, 4, 5]);

        let msg: Message = PrepareResponse {
            view_number: 1,
            signature: Signature([9; 64]),
        }
        .into();
        let bytes = msg.encode(LIMIT).unwrap();
        assert_eq!(bytes.len(), 2 + 64);
        assert_eq!(&bytes[..2], &[0x21, 1]);
    }

    #[test]
    fn test_roundtrip() {
        let messages: Vec<Message> = vec![
            ChangeView {
                view_number: 0,
                new_view_number: 1,
            }
            .into(),
            request().into(),
            PrepareResponse {
                view_number: 3,
                signature: Signature([0xab; 64]),
            }
            .into(),
        ];
        for msg in messages {
            let bytes = msg.encode(LIMIT).unwrap();
            assert_eq!(Message::decode(&bytes, LIMIT).unwrap(), msg);
        }
    }

    #[test]
    fn test_zero_view_change_rejected() {
        assert!(matches!(
            Message::decode(&[0x00, 3, 0], LIMIT),
            Err(CodecError::ZeroViewChange)
        ));
    }

    #[test]
    fn test_unknown_kind_and_truncation() {
        assert!(matches!(
            Message::decode(&[0x42, 0, 1], LIMIT),
            Err(CodecError::UnknownMessageType(0x42))
        ));
        assert!(matches!(Message::decode(&[0x21], LIMIT), Err(CodecError::Truncated(1))));
        assert!(matches!(
            Message::decode(&[0x21, 0, 1, 2], LIMIT),
            Err(CodecError::Serialization(_))
        ));
    }

    #[test]
    fn test_reward_hash_mismatch_rejected() {
        let mut req = request();
        req.transaction_hashes[0] = Hash256::digest(b"someone else");
        let bytes = Message::from(req).encode(LIMIT).unwrap();
        assert!(matches!(
            Message::decode(&bytes, LIMIT),
            Err(CodecError::RewardHashMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let mut req = request();
        let dup = req.transaction_hashes[1];
        req.transaction_hashes.push(dup);
        let bytes = Message::from(req).encode(LIMIT).unwrap();
        assert!(matches!(
            Message::decode(&bytes, LIMIT),
            Err(CodecError::DuplicateTransactionHash(h)) if h == dup
        ));
    }

    #[test]
    fn test_empty_proposal_rejected() {
        let mut req = request();
        req.transaction_hashes.clear();
        let bytes = Message::from(req).encode(LIMIT).unwrap();
        assert!(matches!(
            Message::decode(&bytes, LIMIT),
            Err(CodecError::EmptyProposal)
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Message::from(ChangeView {
            view_number: 0,
            new_view_number: 1,
        })
        .encode(LIMIT)
        .unwrap();
        bytes.push(0);
        assert!(Message::decode(&bytes, LIMIT).is_err());
    }
}
