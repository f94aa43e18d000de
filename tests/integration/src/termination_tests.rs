//! Terminal outcomes and observational callbacks

use crate::test_utils::*;
use ausweis_flow::ErrorReason;
use ausweis_protocol::{Command, RESULT_MINOR_CANCELLATION_BY_USER};
use serde_json::json;

#[tokio::test]
async fn test_successful_auth_reports_refresh_url() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(auth_ok(Some(REFRESH_URL)));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Success(REFRESH_URL.to_string())
    );
    assert!(!harness.flow.is_active());
    // Success does not cancel
    harness.assert_no_command().await;
}

#[tokio::test]
async fn test_successful_auth_without_url_is_an_error() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(auth_ok(None));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(
            ErrorReason::Unknown,
            "Missing 'url' parameter in successful 'AUTH' message.".to_string()
        )
    );
    assert_eq!(harness.next_command().await, Command::Cancel);
}

#[tokio::test]
async fn test_user_cancellation_in_service() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(auth_error(
        RESULT_MINOR_CANCELLATION_BY_USER,
        "The process has been cancelled.",
    ));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(
            ErrorReason::UserCancelled,
            "The process has been cancelled.".to_string()
        )
    );
    assert!(!harness.flow.is_active());
}

#[tokio::test]
async fn test_other_auth_failure_is_unknown() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(auth_error(
        "http://www.bsi.bund.de/ecard/api/1.1/resultminor/dp#timeout",
        "The maximum time was exceeded.",
    ));
    match harness.delegate.next_terminal().await {
        FlowEvent::Error(reason, message) => {
            assert_eq!(reason, ErrorReason::Unknown);
            assert!(message.contains("The maximum time was exceeded."));
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_acknowledgement_keeps_flow_running() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(auth_started());
    settle().await;
    assert!(harness.flow.is_active());
    assert!(harness.delegate.events().is_empty());
}

#[tokio::test]
async fn test_can_request_means_card_locked() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(prompt_message("ENTER_CAN"));
    match harness.delegate.next_terminal().await {
        FlowEvent::Error(reason, message) => {
            assert_eq!(reason, ErrorReason::CardLocked);
            assert!(message.contains("CAN"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    assert_eq!(harness.next_command().await, Command::Cancel);
    harness.assert_no_command().await;
    assert!(!harness
        .channel
        .sent_commands()
        .iter()
        .any(|command| matches!(command, Command::SetCan { .. })));
}

#[tokio::test]
async fn test_puk_request_means_card_locked() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(prompt_message("ENTER_PUK"));
    match harness.delegate.next_terminal().await {
        FlowEvent::Error(reason, message) => {
            assert_eq!(reason, ErrorReason::CardLocked);
            assert!(message.contains("PUK"));
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(harness.next_command().await, Command::Cancel);
    harness.assert_no_command().await;
}

#[tokio::test]
async fn test_messages_after_termination_are_ignored() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;
    harness.emit(auth_ok(Some(REFRESH_URL)));
    harness.delegate.next_terminal().await;
    let before = harness.delegate.events();

    harness.emit(reader_message(json!({ "retryCounter": 3 })));
    harness.emit(status_message("AUTH", 90));
    harness.emit(json!({ "msg": "INSERT_CARD" }));
    harness.emit(enter_pin_message(Some(3)));
    harness.emit(prompt_message("ENTER_PUK"));
    harness.emit(auth_error(RESULT_MINOR_CANCELLATION_BY_USER, "late"));
    settle().await;

    assert_eq!(harness.delegate.events(), before);
    harness.assert_no_command().await;
}

#[tokio::test]
async fn test_reader_updates_report_card_presence() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(reader_message(json!({
        "inoperative": false,
        "deactivated": false,
        "retryCounter": 3,
    })));
    harness.emit(reader_message(json!({})));
    harness.emit(reader_message(serde_json::Value::Null));
    settle().await;

    assert_eq!(
        harness.delegate.events(),
        vec![
            FlowEvent::CardAttached(true),
            FlowEvent::CardAttached(false),
            FlowEvent::CardAttached(false),
        ]
    );
}

#[tokio::test]
async fn test_progress_is_reported_for_auth_workflow_only() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(status_message("AUTH", 20));
    harness.emit(status_message("CHANGE_PIN", 50));
    harness.emit(status_message("AUTH", 80));
    settle().await;

    assert_eq!(
        harness.delegate.events(),
        vec![FlowEvent::Progress(20), FlowEvent::Progress(80)]
    );
}

#[tokio::test]
async fn test_insert_card_asks_to_attach() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(json!({ "msg": "INSERT_CARD" }));
    settle().await;
    assert_eq!(harness.delegate.events(), vec![FlowEvent::AttachCard]);
}

#[tokio::test]
async fn test_unreadable_and_unrelated_messages_are_skipped() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.channel.emit("not json at all");
    harness.emit(json!({ "msg": "SOMETHING_NEW" }));
    harness.emit(json!({ "msg": "BAD_STATE", "error": "RUN_AUTH" }));
    harness.emit(json!({ "msg": "API_LEVEL", "available": [1, 2], "current": 2 }));
    settle().await;

    assert!(harness.flow.is_active());
    assert!(harness.delegate.events().is_empty());
    harness.assert_no_command().await;

    harness.emit(auth_ok(Some(REFRESH_URL)));
    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Success(REFRESH_URL.to_string())
    );
}

#[tokio::test]
async fn test_closed_message_stream_ends_flow() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.channel.close();
    assert!(matches!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(ErrorReason::Unknown, _)
    ));
    assert_eq!(harness.next_command().await, Command::Cancel);
    assert!(!harness.flow.is_active());
}

#[tokio::test]
async fn test_lost_messages_end_flow() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    // More than the inbound buffer holds, before the pump gets to run
    harness.emit(enter_pin_message(Some(3)));
    for progress in 0..70 {
        harness.emit(status_message("AUTH", progress));
    }

    assert_eq!(
        harness.delegate.next_terminal().await,
        FlowEvent::Error(
            ErrorReason::Unknown,
            "Messages from identity service were lost".to_string()
        )
    );
    assert_eq!(harness.next_command().await, Command::Cancel);
    harness.assert_no_command().await;
    assert!(!harness.flow.is_active());
    assert!(!harness
        .delegate
        .events()
        .iter()
        .any(|event| matches!(event, FlowEvent::PinRequested { .. })));
}

#[tokio::test]
async fn test_card_with_unmodelled_keys_counts_as_attached() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(reader_message(json!({ "pinDeactivated": false })));
    settle().await;
    assert_eq!(harness.delegate.events(), vec![FlowEvent::CardAttached(true)]);
}

#[tokio::test]
async fn test_out_of_range_progress_is_clamped() {
    let harness = Harness::new(RecordingDelegate::new());
    harness.start_active().await;

    harness.emit(json!({ "msg": "STATUS", "workflow": "AUTH", "progress": -10, "state": null }));
    harness.emit(json!({ "msg": "STATUS", "workflow": "AUTH", "progress": 130, "state": null }));
    settle().await;

    assert_eq!(
        harness.delegate.events(),
        vec![FlowEvent::Progress(0), FlowEvent::Progress(100)]
    );
    assert!(harness.flow.is_active());
}
