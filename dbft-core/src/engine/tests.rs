// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::messages::{PrepareRequest, PrepareResponse};
use crate::testing::{
    make_validators, mock_key_pair, AllowAllPolicy, DenyListPolicy, ManualClock, MemoryLedger,
    MockTransaction, MockWallet,
};
use dbft_traits::Transaction;

type TestEngine = ConsensusEngine<MemoryLedger, AllowAllPolicy, MockWallet>;

const N: usize = 4;
const NOW_MS: u64 = 1_000_000;

struct Node {
    engine: TestEngine,
    ledger: Arc<MemoryLedger>,
    clock: Arc<ManualClock>,
}

fn config() -> ConsensusConfig {
    ConsensusConfig {
        block_interval_ms: 1_000,
        ..ConsensusConfig::default()
    }
}

fn node_with(wallet: MockWallet) -> Node {
    let ledger = Arc::new(MemoryLedger::new(make_validators(N)));
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let engine = ConsensusEngine::new(
        ledger.clone(),
        Arc::new(AllowAllPolicy),
        Arc::new(wallet),
        clock.clone(),
        config(),
    );
    Node {
        engine,
        ledger,
        clock,
    }
}

fn started(index: usize) -> Node {
    let mut node = node_with(MockWallet::validator(index));
    assert!(node.engine.start().is_accepted());
    node
}

fn broadcasts(actions: &[ConsensusAction<MockTransaction>]) -> Vec<ConsensusPayload> {
    actions
        .iter()
        .filter_map(|a| match a {
            ConsensusAction::Broadcast(p) => Some(p.clone()),
            _ => None,
        })
        .collect()
}

fn timers(actions: &[ConsensusAction<MockTransaction>]) -> Vec<(TimerKey, Duration)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ConsensusAction::ScheduleTimer { key, delay } => Some((*key, *delay)),
            _ => None,
        })
        .collect()
}

fn message_of(payload: &ConsensusPayload) -> ConsensusMessage<MockTransaction> {
    payload.message(config().max_message_size).unwrap()
}

/// A payload from validator `sender` at height 1 on top of genesis.
fn payload_from(
    sender: usize,
    timestamp: u32,
    message: ConsensusMessage<MockTransaction>,
) -> ConsensusPayload {
    let mut payload = ConsensusPayload {
        version: PROTOCOL_VERSION,
        prev_hash: MemoryLedger::genesis_hash(),
        block_index: 1,
        validator_index: sender as ValidatorIndex,
        timestamp,
        data: message.encode(config().max_message_size).unwrap(),
        witness: Signature::zero(),
    };
    payload.sign(&MockWallet::validator(sender), &mock_key_pair(sender));
    payload
}

fn change_view_from(sender: usize, new_view: ViewNumber) -> ConsensusPayload {
    payload_from(
        sender,
        (NOW_MS / 1000) as u32,
        ChangeView {
            view_number: 0,
            new_view_number: new_view,
        }
        .into(),
    )
}

/// Start the primary of height 1 view 0 (validator 1) and fire its timer.
fn proposing_primary() -> (Node, ConsensusPayload) {
    let mut primary = started(1);
    primary.engine.take_actions();
    assert!(primary.engine.on_timer(TimerKey::new(1, 0)).is_accepted());
    let sent = broadcasts(&primary.engine.take_actions());
    assert_eq!(sent.len(), 1);
    (primary, sent[0].clone())
}

#[test]
fn test_start_schedules_backup_timeout() {
    let mut node = started(0);
    assert_eq!(node.engine.context().block_index(), 1);
    assert_eq!(node.engine.context().role(), Role::Backup);
    assert_eq!(node.engine.context().primary_index(), 1);

    let actions = node.engine.take_actions();
    assert_eq!(
        timers(&actions),
        vec![(TimerKey::new(1, 0), Duration::from_millis(2_000))]
    );
    assert_eq!(
        node.engine.start(),
        ProcessResult::ignored(IgnoreReason::AlreadyStarted)
    );
}

#[test]
fn test_primary_proposes_immediately_at_first_height() {
    let mut node = started(1);
    assert_eq!(node.engine.context().role(), Role::Primary);
    assert_eq!(
        timers(&node.engine.take_actions()),
        vec![(TimerKey::new(1, 0), Duration::ZERO)]
    );
}

#[test]
fn test_events_before_start_are_ignored() {
    let mut node = node_with(MockWallet::validator(0));
    let not_started = ProcessResult::ignored(IgnoreReason::NotStarted);
    assert_eq!(node.engine.on_timer(TimerKey::new(1, 0)), not_started);
    assert_eq!(node.engine.on_payload(&change_view_from(2, 1)), not_started);
    assert_eq!(node.engine.set_view(3), not_started);
    assert!(node.engine.take_actions().is_empty());
}

#[test]
fn test_observer_never_schedules() {
    let mut node = node_with(MockWallet::observer());
    assert!(node.engine.start().is_accepted());
    assert_eq!(node.engine.context().role(), Role::None);
    assert!(node.engine.take_actions().is_empty());
    assert_eq!(
        node.engine.on_timer(TimerKey::new(1, 0)),
        ProcessResult::ignored(IgnoreReason::NotValidator)
    );
}

#[test]
fn test_stale_timer_is_ignored() {
    let mut node = started(0);
    node.engine.take_actions();
    assert_eq!(
        node.engine.on_timer(TimerKey::new(1, 3)),
        ProcessResult::ignored(IgnoreReason::StaleTimer)
    );
    assert_eq!(
        node.engine.on_timer(TimerKey::new(2, 0)),
        ProcessResult::ignored(IgnoreReason::StaleTimer)
    );
    assert!(node.engine.take_actions().is_empty());
}

#[test]
fn test_primary_timer_sends_prepare_request() {
    let (primary, payload) = proposing_primary();
    let context = primary.engine.context();
    assert!(context.has(StateFlags::PRIMARY | StateFlags::REQUEST_SENT));
    assert_eq!(context.signature_count(), 1);
    assert_eq!(payload.validator_index, 1);
    assert_eq!(payload.timestamp, (NOW_MS / 1000) as u32);

    match message_of(&payload) {
        ConsensusMessage::PrepareRequest(request) => {
            assert_eq!(request.transaction_hashes.len(), 1);
            assert!(request.reward_transaction.is_reward());
            assert_eq!(request.transaction_hashes[0], request.reward_transaction.hash());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(primary.engine.metrics().snapshot().proposals_sent, 1);
}

#[test]
fn test_primary_announces_mempool_transactions() {
    let mut primary = started(1);
    let tx = MockTransaction::new(7, 3);
    primary.ledger.add_to_mempool(tx.clone());
    primary.engine.take_actions();
    primary.engine.on_timer(TimerKey::new(1, 0));

    let actions = primary.engine.take_actions();
    assert!(actions.contains(&ConsensusAction::Inventory {
        kind: InventoryKind::Transaction,
        hashes: vec![tx.hash()],
    }));
    let request = match message_of(&broadcasts(&actions)[0]) {
        ConsensusMessage::PrepareRequest(request) => request,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(request.reward_transaction.output_value(), 3);
    assert_eq!(request.transaction_hashes[1], tx.hash());
}

#[test]
fn test_backup_signs_valid_request() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    backup.engine.take_actions();

    assert!(backup.engine.on_payload(&request).is_accepted());
    let context = backup.engine.context();
    assert!(context.has(StateFlags::REQUEST_RECEIVED | StateFlags::SIGNATURE_SENT));
    assert_eq!(context.signature_count(), 2);

    let sent = broadcasts(&backup.engine.take_actions());
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        message_of(&sent[0]),
        ConsensusMessage::PrepareResponse(_)
    ));
    // Envelope timestamp follows the proposal.
    assert_eq!(sent[0].timestamp, request.timestamp);
}

#[test]
fn test_quorum_of_responses_relays_block() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    let mut other = started(2);
    backup.engine.on_payload(&request);
    other.engine.on_payload(&request);
    backup.engine.take_actions();
    let response = broadcasts(&other.engine.take_actions()).remove(0);

    assert!(backup.engine.on_payload(&response).is_accepted());
    let blocks: Vec<_> = backup
        .engine
        .take_actions()
        .into_iter()
        .filter_map(|a| match a {
            ConsensusAction::RelayBlock(block) => Some(block),
            _ => None,
        })
        .collect();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].verify(&MockWallet::observer()));
    assert_eq!(blocks[0].index(), 1);
    assert!(backup.engine.context().has(StateFlags::BLOCK_SENT));

    assert_eq!(
        backup.engine.on_payload(&change_view_from(3, 1)),
        ProcessResult::ignored(IgnoreReason::BlockSent)
    );
}

#[test]
fn test_duplicate_response_is_ignored() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    let mut other = started(2);
    backup.engine.on_payload(&request);
    other.engine.on_payload(&request);
    let response = broadcasts(&other.engine.take_actions()).remove(0);

    assert!(backup.engine.on_payload(&response).is_accepted());
    assert_eq!(
        backup.engine.on_payload(&response),
        ProcessResult::ignored(IgnoreReason::BlockSent)
    );

    // Without a proposal the response is held, and a second copy is refused.
    let mut late = started(3);
    assert!(late.engine.on_payload(&response).is_accepted());
    assert_eq!(late.engine.context().signature_count(), 1);
    assert_eq!(
        late.engine.on_payload(&response),
        ProcessResult::ignored(IgnoreReason::DuplicateSignature)
    );
}

#[test]
fn test_response_with_bad_signature_is_rejected() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    backup.engine.on_payload(&request);
    backup.engine.take_actions();

    let forged = payload_from(
        2,
        request.timestamp,
        PrepareResponse {
            view_number: 0,
            signature: Signature([9; 64]),
        }
        .into(),
    );
    assert_eq!(
        backup.engine.on_payload(&forged),
        ProcessResult::ignored(IgnoreReason::InvalidSignature)
    );
    assert_eq!(backup.engine.context().signature_count(), 2);
}

#[test]
fn test_request_from_wrong_validator() {
    let (_primary, request) = proposing_primary();
    let mut request_from_2 = request.clone();
    request_from_2.validator_index = 2;
    request_from_2.sign(&MockWallet::validator(2), &mock_key_pair(2));

    let mut backup = started(0);
    assert_eq!(
        backup.engine.on_payload(&request_from_2),
        ProcessResult::ignored(IgnoreReason::NotPrimary)
    );
}

#[test]
fn test_request_with_future_timestamp() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    backup.clock.set(NOW_MS - 700_000);
    assert_eq!(
        backup.engine.on_payload(&request),
        ProcessResult::ignored(IgnoreReason::InvalidTimestamp)
    );
}

#[test]
fn test_request_not_after_previous_block() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    assert_eq!(backup.engine.context().prev_timestamp(), 0);

    let same_as_head = payload_from(1, 0, message_of(&request));
    assert_eq!(
        backup.engine.on_payload(&same_as_head),
        ProcessResult::ignored(IgnoreReason::InvalidTimestamp)
    );
    assert!(!backup.engine.context().has(StateFlags::REQUEST_RECEIVED));
}

#[test]
fn test_request_with_persisted_transaction() {
    let tx = MockTransaction::new(21, 2);
    let mut primary = started(1);
    primary.ledger.add_to_mempool(tx.clone());
    primary.engine.take_actions();
    primary.engine.on_timer(TimerKey::new(1, 0));
    let request = broadcasts(&primary.engine.take_actions()).remove(0);

    let mut a = started(0);
    let mut b = started(3);
    a.ledger.add_to_mempool(tx.clone());
    b.ledger.add_to_mempool(tx.clone());
    a.engine.on_payload(&request);
    b.engine.on_payload(&request);
    let response = broadcasts(&b.engine.take_actions()).remove(0);
    a.engine.on_payload(&response);
    let block = a
        .engine
        .take_actions()
        .into_iter()
        .find_map(|action| match action {
            ConsensusAction::RelayBlock(block) => Some(block),
            _ => None,
        })
        .unwrap();

    // The block lands in the ledger before this node hears about it.
    let mut late = started(2);
    assert!(late.ledger.persist(&block));
    assert_eq!(
        late.engine.on_payload(&request),
        ProcessResult::ignored(IgnoreReason::KnownTransaction)
    );
    assert!(!late.engine.context().has(StateFlags::REQUEST_RECEIVED));
}

#[test]
fn test_observer_does_not_adopt_request() {
    let (_primary, request) = proposing_primary();
    let mut observer = node_with(MockWallet::observer());
    observer.engine.start();
    assert_eq!(
        observer.engine.on_payload(&request),
        ProcessResult::ignored(IgnoreReason::NotBackup)
    );
    assert!(observer.engine.context().proposal().is_none());
}

#[test]
fn test_request_with_forged_signature() {
    let (_primary, request) = proposing_primary();
    let mut message = match message_of(&request) {
        ConsensusMessage::PrepareRequest(m) => m,
        other => panic!("unexpected {:?}", other),
    };
    message.signature = Signature([1; 64]);
    let forged = payload_from(1, request.timestamp, message.into());

    let mut backup = started(0);
    assert_eq!(
        backup.engine.on_payload(&forged),
        ProcessResult::ignored(IgnoreReason::InvalidSignature)
    );
    assert!(!backup.engine.context().has(StateFlags::REQUEST_RECEIVED));
}

#[test]
fn test_envelope_filters() {
    let mut node = started(0);

    assert_eq!(
        node.engine.on_payload(&change_view_from(0, 1)),
        ProcessResult::ignored(IgnoreReason::OwnPayload)
    );

    let mut wrong_height = change_view_from(2, 1);
    wrong_height.block_index = 5;
    assert_eq!(
        node.engine.on_payload(&wrong_height),
        ProcessResult::ignored(IgnoreReason::WrongHeight)
    );

    let mut tampered = change_view_from(2, 1);
    tampered.timestamp += 1;
    assert_eq!(
        node.engine.on_payload(&tampered),
        ProcessResult::ignored(IgnoreReason::InvalidWitness)
    );

    let mut unknown = change_view_from(2, 1);
    unknown.validator_index = 9;
    assert_eq!(
        node.engine.on_payload(&unknown),
        ProcessResult::ignored(IgnoreReason::UnknownValidator)
    );

    let mut old_version = change_view_from(2, 1);
    old_version.version = PROTOCOL_VERSION + 1;
    assert_eq!(
        node.engine.on_payload(&old_version),
        ProcessResult::ignored(IgnoreReason::VersionMismatch)
    );

    assert_eq!(
        node.engine.on_payload_bytes(&[1, 2, 3]),
        ProcessResult::ignored(IgnoreReason::Malformed)
    );

    let response_in_view_1 = payload_from(
        2,
        1_000,
        PrepareResponse {
            view_number: 1,
            signature: Signature::zero(),
        }
        .into(),
    );
    assert_eq!(
        node.engine.on_payload(&response_in_view_1),
        ProcessResult::ignored(IgnoreReason::WrongView)
    );
    assert_eq!(node.engine.metrics().snapshot().payloads_ignored, 7);
}

#[test]
fn test_view_change_needs_quorum() {
    let mut node = started(0);
    assert!(node.engine.on_payload(&change_view_from(2, 1)).is_accepted());
    assert!(node.engine.on_payload(&change_view_from(3, 1)).is_accepted());
    assert_eq!(node.engine.context().view_number(), 0);

    // Own timeout makes three of four.
    assert!(node.engine.on_timer(TimerKey::new(1, 0)).is_accepted());
    let context = node.engine.context();
    assert_eq!(context.view_number(), 1);
    assert_eq!(context.role(), Role::Primary);
    assert!(!context.has(StateFlags::VIEW_CHANGING));

    let actions = node.engine.take_actions();
    let sent = broadcasts(&actions);
    assert!(matches!(
        message_of(&sent[0]),
        ConsensusMessage::ChangeView(ChangeView { new_view_number: 1, .. })
    ));
    // No block has been received yet, so the new primary proposes at once.
    assert_eq!(timers(&actions).last(), Some(&(TimerKey::new(1, 1), Duration::ZERO)));
    assert_eq!(node.engine.metrics().snapshot().view_changes, 1);
}

#[test]
fn test_stale_view_change_is_ignored() {
    let mut node = started(0);
    assert!(node.engine.on_payload(&change_view_from(2, 2)).is_accepted());
    assert_eq!(
        node.engine.on_payload(&change_view_from(2, 2)),
        ProcessResult::ignored(IgnoreReason::StaleViewChange)
    );
    assert_eq!(
        node.engine.on_payload(&change_view_from(2, 1)),
        ProcessResult::ignored(IgnoreReason::StaleViewChange)
    );
    assert_eq!(node.engine.context().expected_view(2), 2);
}

#[test]
fn test_timeout_backs_off() {
    let mut node = started(0);
    node.engine.take_actions();
    node.engine.on_timer(TimerKey::new(1, 0));
    let context = node.engine.context();
    assert!(context.has(StateFlags::VIEW_CHANGING));
    assert_eq!(context.expected_view(0), 1);
    assert_eq!(
        timers(&node.engine.take_actions()),
        vec![(TimerKey::new(1, 0), Duration::from_millis(4_000))]
    );

    // A second timeout asks for the view after that.
    node.engine.on_timer(TimerKey::new(1, 0));
    assert_eq!(node.engine.context().expected_view(0), 2);
    assert_eq!(node.engine.metrics().snapshot().timeouts, 2);
}

#[test]
fn test_invalid_transaction_triggers_view_change() {
    let mut primary = started(1);
    let tx = MockTransaction::new(5, 2);
    primary.ledger.add_to_mempool(tx.clone());
    primary.engine.take_actions();
    primary.engine.on_timer(TimerKey::new(1, 0));
    let request = broadcasts(&primary.engine.take_actions()).remove(0);

    let mut backup = started(0);
    backup.ledger.add_unverified(tx.clone());
    backup.ledger.mark_invalid(tx.hash());
    backup.engine.take_actions();

    assert!(backup.engine.on_payload(&request).is_accepted());
    let context = backup.engine.context();
    assert!(context.has(StateFlags::VIEW_CHANGING));
    assert!(!context.has(StateFlags::SIGNATURE_SENT));
    assert_eq!(context.expected_view(0), 1);
    assert_eq!(backup.engine.metrics().snapshot().transactions_rejected, 1);

    let sent = broadcasts(&backup.engine.take_actions());
    assert!(matches!(message_of(&sent[0]), ConsensusMessage::ChangeView(_)));
}

#[test]
fn test_policy_rejection_triggers_view_change() {
    let tx = MockTransaction::new(8, 5);
    let mut primary = started(1);
    primary.ledger.add_to_mempool(tx.clone());
    primary.engine.take_actions();
    primary.engine.on_timer(TimerKey::new(1, 0));
    let request = broadcasts(&primary.engine.take_actions()).remove(0);

    let ledger = Arc::new(MemoryLedger::new(make_validators(N)));
    ledger.add_to_mempool(tx.clone());
    let mut backup: ConsensusEngine<MemoryLedger, DenyListPolicy, MockWallet> =
        ConsensusEngine::new(
            ledger,
            Arc::new(DenyListPolicy::new(vec![tx.hash()])),
            Arc::new(MockWallet::validator(0)),
            Arc::new(ManualClock::new(NOW_MS)),
            config(),
        );
    assert!(backup.start().is_accepted());
    backup.take_actions();

    assert!(backup.on_payload(&request).is_accepted());
    let context = backup.context();
    assert!(context.has(StateFlags::VIEW_CHANGING));
    assert!(!context.has(StateFlags::SIGNATURE_SENT));
    assert_eq!(context.expected_view(0), 1);
    assert_eq!(backup.metrics().snapshot().transactions_rejected, 1);

    let sent = broadcasts(&backup.take_actions());
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        message_of(&sent[0]),
        ConsensusMessage::ChangeView(ChangeView { new_view_number: 1, .. })
    ));
}

#[test]
fn test_missing_transactions_are_requested() {
    let mut primary = started(1);
    let tx = MockTransaction::new(11, 4);
    primary.ledger.add_to_mempool(tx.clone());
    primary.engine.take_actions();
    primary.engine.on_timer(TimerKey::new(1, 0));
    let request = broadcasts(&primary.engine.take_actions()).remove(0);

    let mut backup = started(0);
    backup.engine.take_actions();
    assert!(backup.engine.on_payload(&request).is_accepted());
    let actions = backup.engine.take_actions();
    assert!(actions.contains(&ConsensusAction::RequestTransactions(vec![tx.hash()])));
    assert!(broadcasts(&actions).is_empty());

    assert_eq!(
        backup.engine.on_transaction(MockTransaction::new(99, 1)),
        ProcessResult::ignored(IgnoreReason::Irrelevant)
    );
    assert!(backup.engine.on_transaction(tx.clone()).is_accepted());
    assert!(backup.engine.context().has(StateFlags::SIGNATURE_SENT));
    assert_eq!(
        backup.engine.on_transaction(tx),
        ProcessResult::ignored(IgnoreReason::NotCollecting)
    );
}

#[test]
fn test_wrong_reward_is_refused() {
    let (_primary, request) = proposing_primary();
    let mut message: PrepareRequest<MockTransaction> = match message_of(&request) {
        ConsensusMessage::PrepareRequest(m) => m,
        other => panic!("unexpected {:?}", other),
    };
    // Pays out although no fees were collected.
    let reward = MockTransaction::reward(message.nonce, 50);
    message.transaction_hashes[0] = reward.hash();
    message.reward_transaction = reward;

    // Re-sign the header so only the reward amount is wrong.
    let primary_context = RoundContext::<MockTransaction>::new(
        1,
        MemoryLedger::genesis_hash(),
        0,
        make_validators(N),
        Some(1),
    );
    let proposal = crate::state::Proposal {
        timestamp: request.timestamp,
        nonce: message.nonce,
        next_consensus: message.next_consensus,
        transaction_hashes: message.transaction_hashes.clone(),
    };
    let header = primary_context.header_for(&proposal);
    message.signature = MockWallet::validator(1).sign(&header.hash_data(), &mock_key_pair(1));
    let bad = payload_from(1, request.timestamp, message.into());

    let mut backup = started(0);
    assert!(backup.engine.on_payload(&bad).is_accepted());
    assert!(backup.engine.context().has(StateFlags::VIEW_CHANGING));
    assert!(!backup.engine.context().has(StateFlags::SIGNATURE_SENT));
}

#[test]
fn test_block_persisted_starts_next_height() {
    let mut node = started(2);
    node.engine.take_actions();

    let (_primary, request) = proposing_primary();
    let mut a = started(0);
    let mut b = started(3);
    a.engine.on_payload(&request);
    b.engine.on_payload(&request);
    let response = broadcasts(&b.engine.take_actions()).remove(0);
    a.engine.on_payload(&response);
    let block = a
        .engine
        .take_actions()
        .into_iter()
        .find_map(|action| match action {
            ConsensusAction::RelayBlock(block) => Some(block),
            _ => None,
        })
        .unwrap();

    assert!(node.ledger.persist(&block));
    assert!(node.engine.on_block_persisted(&block).is_accepted());

    let context = node.engine.context();
    assert_eq!(context.block_index(), 2);
    assert_eq!(context.prev_hash(), block.hash());
    assert_eq!(context.role(), Role::Primary);
    assert_eq!(
        timers(&node.engine.take_actions()),
        vec![(TimerKey::new(2, 0), Duration::from_millis(1_000))]
    );
}

#[test]
fn test_set_view_jumps_without_quorum() {
    let mut node = started(0);
    assert!(node.engine.set_view(2).is_accepted());
    assert_eq!(node.engine.context().view_number(), 2);
    assert_eq!(node.engine.context().primary_index(), 3);
    assert_eq!(node.engine.context().expected_view(0), 2);
}

#[test]
fn test_request_clears_unverified_signatures() {
    let (_primary, request) = proposing_primary();
    let mut backup = started(0);
    backup.engine.take_actions();

    let forged = payload_from(
        2,
        request.timestamp,
        PrepareResponse {
            view_number: 0,
            signature: Signature([9; 64]),
        }
        .into(),
    );
    assert!(backup.engine.on_payload(&forged).is_accepted());
    assert_eq!(backup.engine.context().signature_count(), 1);

    assert!(backup.engine.on_payload(&request).is_accepted());
    let context = backup.engine.context();
    assert!(context.has(StateFlags::SIGNATURE_SENT));
    assert_eq!(context.signature_count(), 2);
    assert!(context.signature(2).is_none());
    assert!(context.signature(1).is_some());
}

#[test]
fn test_new_primary_offers_signed_proposal_again() {
    let (_primary, request) = proposing_primary();
    let original = match message_of(&request) {
        ConsensusMessage::PrepareRequest(m) => m,
        other => panic!("unexpected {:?}", other),
    };

    let mut node = started(0);
    assert!(node.engine.on_payload(&request).is_accepted());
    node.engine.take_actions();

    assert!(node.engine.set_view(1).is_accepted());
    let context = node.engine.context();
    assert_eq!(context.role(), Role::Primary);
    assert!(context.has(StateFlags::SIGNATURE_SENT));
    assert!(!context.has(StateFlags::REQUEST_SENT));
    node.engine.take_actions();

    assert!(node.engine.on_timer(TimerKey::new(1, 1)).is_accepted());
    let sent = broadcasts(&node.engine.take_actions());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].timestamp, request.timestamp);
    match message_of(&sent[0]) {
        ConsensusMessage::PrepareRequest(again) => {
            assert_eq!(again.view_number, 1);
            assert_eq!(again.nonce, original.nonce);
            assert_eq!(again.next_consensus, original.next_consensus);
            assert_eq!(again.transaction_hashes, original.transaction_hashes);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(node.engine.context().signature_count(), 2);

    let mut backup = started(2);
    backup.engine.set_view(1);
    assert!(backup.engine.on_payload(&sent[0]).is_accepted());
    assert!(backup.engine.context().has(
        StateFlags::BACKUP | StateFlags::REQUEST_RECEIVED | StateFlags::SIGNATURE_SENT
    ));
}

#[test]
fn test_timeout_at_last_view_keeps_timer_armed() {
    let mut node = started(0);
    assert!(node.engine.set_view(ViewNumber::MAX).is_accepted());
    assert_eq!(node.engine.context().role(), Role::Backup);
    node.engine.take_actions();

    assert!(node.engine.on_timer(TimerKey::new(1, ViewNumber::MAX)).is_accepted());
    let actions = node.engine.take_actions();
    assert!(broadcasts(&actions).is_empty());
    assert_eq!(
        timers(&actions),
        vec![(
            TimerKey::new(1, ViewNumber::MAX),
            node.engine.schedule.backoff(ViewNumber::MAX)
        )]
    );
    assert_eq!(node.engine.context().expected_view(0), ViewNumber::MAX);
}
