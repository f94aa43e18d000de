//! Access-rights and PIN negotiation

use crate::test_utils::*;
use ausweis_core::FlowConfig;
use ausweis_flow::{AccessRightsDecision, ErrorReason, MemoryChannel};
use ausweis_protocol::{Command, REDACTED};
use std::sync::Arc;
use tokio::sync::Notify;

const EFFECTIVE: &[&str] = &["Address", "FamilyName", "GivenNames", "AgeVerification"];
const REQUIRED: &[&str] = &["Address", "FamilyName"];
const OPTIONAL: &[&str] = &["GivenNames", "AgeVerification"];

#[tokio::test]
async fn test_default_negotiator_accepts_effective_rights() {
    let harness = Harness::new(MinimalDelegate::new());
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    assert_eq!(harness.next_command().await, Command::Accept);
    harness.assert_no_command().await;

    assert!(!harness
        .channel
        .sent_commands()
        .iter()
        .any(|command| matches!(command, Command::SetAccessRights { .. })));
    assert!(harness.flow.is_active());
}

#[tokio::test]
async fn test_delegate_sees_request() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    assert_eq!(harness.next_command().await, Command::Accept);

    match &harness.delegate.events()[0] {
        FlowEvent::AccessRightsRequested(request) => {
            assert_eq!(request.effective, rights(EFFECTIVE));
            assert_eq!(request.required, rights(REQUIRED));
            assert_eq!(request.optional, rights(OPTIONAL));
            assert_eq!(
                request.transaction_info.as_deref(),
                Some("this is a test for the given transaction")
            );
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_narrowed_rights_are_set_before_accept() {
    let decision = AccessRightsDecision::Accept(rights(&["Address", "FamilyName", "GivenNames"]));
    let harness = Harness::new(RecordingDelegate::new().with_rights(RightsAnswer::Decide(decision)));
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    assert_eq!(
        harness.next_command().await,
        Command::SetAccessRights {
            chat: rights(&["Address", "FamilyName", "GivenNames"])
        }
    );
    assert_eq!(harness.next_command().await, Command::Accept);
    assert!(harness.flow.is_active());
}

#[tokio::test]
async fn test_missing_required_right_cancels() {
    let decision = AccessRightsDecision::Accept(rights(&["FamilyName", "GivenNames"]));
    let harness = Harness::new(RecordingDelegate::new().with_rights(RightsAnswer::Decide(decision)));
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    match harness.delegate.next_terminal().await {
        FlowEvent::Error(reason, message) => {
            assert_eq!(reason, ErrorReason::UserCancelled);
            assert!(message.contains("Address"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    // Only the CANCEL of the error exit follows RUN_AUTH
    assert_eq!(harness.next_command().await, Command::Cancel);
    harness.assert_no_command().await;
    assert!(!harness.flow.is_active());
}

#[tokio::test]
async fn test_declined_rights_cancel() {
    let harness = Harness::new(
        RecordingDelegate::new().with_rights(RightsAnswer::Decide(AccessRightsDecision::Decline)),
    );
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    assert!(matches!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(ErrorReason::UserCancelled, _)
    ));
    assert_eq!(harness.next_command().await, Command::Cancel);
}

#[tokio::test]
async fn test_failing_rights_negotiator_ends_flow() {
    let harness = Harness::new(
        RecordingDelegate::new().with_rights(RightsAnswer::Fail("dialog crashed".to_string())),
    );
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(
            ErrorReason::Unknown,
            "Error in onRequestAccessRights callback".to_string()
        )
    );
    assert_eq!(harness.next_command().await, Command::Cancel);

    let errors = harness.delegate.errors();
    assert!(errors[0]
        .cause
        .as_ref()
        .is_some_and(|cause| cause.to_string() == "dialog crashed"));
}

#[tokio::test]
async fn test_cancel_abandons_pending_rights_decision() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(RecordingDelegate::new().with_rights(RightsAnswer::After(
        gate.clone(),
        AccessRightsDecision::AcceptEffective,
    )));
    harness.start_active().await;

    harness.emit(access_rights_message(EFFECTIVE, REQUIRED, OPTIONAL));
    settle().await;
    harness.flow.cancel().await.unwrap();
    assert_eq!(harness.next_command().await, Command::Cancel);

    gate.notify_one();
    harness.assert_no_command().await;
    assert_eq!(harness.delegate.terminal_events().len(), 1);
}

#[tokio::test]
async fn test_pin_is_sent_with_retry_accounting() {
    let harness = Harness::new(RecordingDelegate::new().with_pins(&["111111", "123456"]));
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(3)));
    assert_eq!(
        harness.next_command().await,
        Command::SetPin {
            value: Some("111111".to_string())
        }
    );

    // Wrong PIN: the service asks again with one attempt fewer
    harness.emit(enter_pin_message(Some(2)));
    assert_eq!(
        harness.next_command().await,
        Command::SetPin {
            value: Some("123456".to_string())
        }
    );

    assert_eq!(
        harness.delegate.events(),
        vec![
            FlowEvent::PinRequested {
                attempts_remaining: 2,
                failed_attempts: 0
            },
            FlowEvent::PinRequested {
                attempts_remaining: 1,
                failed_attempts: 1
            },
        ]
    );
    assert!(harness.flow.is_active());
}

#[tokio::test]
async fn test_pin_without_retry_counter_assumes_full_counter() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(enter_pin_message(None));
    assert!(matches!(harness.next_command().await, Command::SetPin { .. }));
    assert_eq!(
        harness.delegate.events(),
        vec![FlowEvent::PinRequested {
            attempts_remaining: 2,
            failed_attempts: 0
        }]
    );
}

#[tokio::test]
async fn test_last_attempt_is_reported_as_one_remaining() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(1)));
    harness.next_command().await;
    assert_eq!(
        harness.delegate.events(),
        vec![FlowEvent::PinRequested {
            attempts_remaining: 1,
            failed_attempts: 2
        }]
    );
}

#[tokio::test]
async fn test_failing_pin_entry_ends_flow() {
    let harness = Harness::new(
        RecordingDelegate::new().with_pin_answer(PinAnswer::Fail("keypad unavailable".to_string())),
    );
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(3)));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(ErrorReason::Unknown, "Error in onEnterPin callback".to_string())
    );
    assert_eq!(harness.next_command().await, Command::Cancel);
    assert!(!harness.flow.is_active());
}

#[tokio::test]
async fn test_unanswered_pin_times_out() {
    let mut config = FlowConfig::default();
    config.negotiation_timeout_ms = Some(50);
    let harness = Harness::with_channel(
        MemoryChannel::new(),
        RecordingDelegate::new().with_pin_answer(PinAnswer::Hang),
        config,
    );
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(3)));
    assert!(matches!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(ErrorReason::Unknown, _)
    ));
    assert_eq!(harness.next_command().await, Command::Cancel);
}

#[tokio::test]
async fn test_pin_never_appears_in_session_log() {
    let harness = Harness::new(RecordingDelegate::new().with_pins(&["654321"]));
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(3)));
    harness.next_command().await;

    let log = harness.flow.sent_commands();
    assert_eq!(
        log.last(),
        Some(&Command::SetPin {
            value: Some(REDACTED.to_string())
        })
    );
    assert!(!format!("{:?}", log).contains("654321"));
}

#[tokio::test]
async fn test_negative_retry_counter_still_asks_for_pin() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(enter_pin_message(Some(-1)));
    assert!(matches!(harness.next_command().await, Command::SetPin { .. }));
    assert_eq!(
        harness.delegate.events(),
        vec![FlowEvent::PinRequested {
            attempts_remaining: 1,
            failed_attempts: 3
        }]
    );
    assert!(harness.flow.is_active());
}

#[tokio::test]
async fn test_unreadable_pin_request_ends_flow() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(serde_json::json!({
        "msg": "ENTER_PIN",
        "reader": { "name": "NFC", "attached": true, "card": { "retryCounter": "two" } },
    }));
    match harness.delegate.next_terminal().await {
        FlowEvent::Error(reason, message) => {
            assert_eq!(reason, ErrorReason::Unknown);
            assert!(message.contains("ENTER_PIN"));
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(harness.next_command().await, Command::Cancel);
    assert!(!harness.flow.is_active());
    assert!(harness.delegate.errors()[0].cause.is_some());
}
