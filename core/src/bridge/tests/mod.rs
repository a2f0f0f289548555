//! Bridge decoding, encoding and dispatch tests


use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinSet;

use super::*;
use crate::executor::RunOutcome;
use crate::plugin::PluginRegistry;
use crate::test_helpers::{RecordingTerminal, ScriptPlugin};

pub(super) const UID: &str = "tab-7";

pub(super) struct Rig {
    pub bridge: Bridge,
    pub outbox: UnboundedReceiver<CoreMessage>,
    pub terminal: Arc<RecordingTerminal>,
}

pub(super) fn rig() -> Rig {
    let (tx, outbox) = mpsc::unbounded_channel();
    let terminal = Arc::new(RecordingTerminal::new());
    let sandbox = Sandbox::builder(UID, tx)
        .registry(PluginRegistry::new().with(Arc::new(ScriptPlugin::unbundled(Language::Python))))
        .terminal(terminal.clone())
        .build();
    Rig {
        bridge: Bridge::new(sandbox),
        outbox,
        terminal,
    }
}

fn line(value: Value) -> String {
    value.to_string()
}

fn sent(rig: &mut Rig) -> Vec<CoreMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rig.outbox.try_recv() {
        messages.push(message);
    }
    messages
}

#[test]
fn test_decode_initialise() {
    let rig = rig();
    let decoded = rig
        .bridge
        .decode(&line(json!({
            "type": "initialise",
            "uid": UID,
            "code": "x = 1",
            "test": "checkerResult = str(x)",
            "wrapCodeInMain": true,
            "dataUrl": "data.db",
            "language": "python",
            "logChanges": true,
        })))
        .unwrap();

    assert_eq!(
        decoded,
        Some(HostMessage::Initialise(InitialiseParams {
            code: "x = 1".to_string(),
            setup: None,
            test: Some("checkerResult = str(x)".to_string()),
            wrap_code_in_main: Some(true),
            data_url: Some("data.db".to_string()),
            language: Some(Language::Python),
            log_changes: Some(true),
            fullscreen: None,
        }))
    );
}

#[test]
fn test_decode_toggles() {
    let rig = rig();
    assert_eq!(
        rig.bridge
            .decode(&line(json!({"type": "toggleRun", "uid": UID, "disableRun": true})))
            .unwrap(),
        Some(HostMessage::ToggleRun { disable_run: true })
    );
    assert_eq!(
        rig.bridge
            .decode(&line(
                json!({"type": "toggleReadOnlyCode", "uid": UID, "readOnlyCode": false})
            ))
            .unwrap(),
        Some(HostMessage::ToggleReadOnlyCode {
            read_only_code: false
        })
    );
}

#[test]
fn test_other_sessions_ignored() {
    let rig = rig();
    let other = line(json!({"type": "ping", "uid": "tab-8", "timestamp": 1}));
    let missing = line(json!({"type": "ping", "timestamp": 1}));

    assert_eq!(rig.bridge.decode(&other).unwrap(), None);
    assert_eq!(rig.bridge.decode(&missing).unwrap(), None);
}

#[test]
fn test_decode_errors() {
    let rig = rig();
    assert!(matches!(
        rig.bridge.decode("[1, 2]"),
        Err(BridgeError::NotAnObject)
    ));
    assert!(matches!(
        rig.bridge.decode("{not json"),
        Err(BridgeError::Malformed(_))
    ));
    assert!(matches!(
        rig.bridge
            .decode(&line(json!({"type": "explode", "uid": UID}))),
        Err(BridgeError::Malformed(_))
    ));
}

#[test]
fn test_encode_stamps_uid() {
    let rig = rig();
    let encoded = rig
        .bridge
        .encode(&CoreMessage::SetupFail {
            message: "broken".to_string(),
        })
        .unwrap();
    let value: Value = serde_json::from_str(&encoded).unwrap();

    assert_eq!(
        value,
        json!({"type": "setupFail", "message": "broken", "uid": UID})
    );
}

#[test]
fn test_encode_type_names() {
    let rig = rig();
    for (message, name) in [
        (CoreMessage::ConfirmInitialised, "confirmInitialised"),
        (CoreMessage::ToggleRun, "toggleRun"),
        (CoreMessage::Resize { height: 10 }, "resize"),
    ] {
        let value: Value = serde_json::from_str(&rig.bridge.encode(&message).unwrap()).unwrap();
        assert_eq!(value["type"], name);
    }
}

#[tokio::test]
async fn test_ping_always_answers() {
    let mut rig = rig();
    let mut runs = JoinSet::new();
    let ping = line(json!({"type": "ping", "uid": UID, "timestamp": 5}));

    rig.bridge.handle_line(&ping, &mut runs).unwrap();
    rig.bridge.handle_line(&ping, &mut runs).unwrap();

    let replies = sent(&mut rig);
    assert_eq!(replies.len(), 2);
    for reply in replies {
        let CoreMessage::Ping { timestamp } = reply else {
            panic!("expected ping, got {reply:?}");
        };
        assert!(timestamp > 5);
    }
}

#[tokio::test]
async fn test_logs_request_drains_logs() {
    let mut rig = rig();
    let mut runs = JoinSet::new();
    rig.bridge.dispatch(
        HostMessage::Initialise(InitialiseParams {
            code: "print(1)".to_string(),
            language: Some(Language::Python),
            log_changes: Some(true),
            ..Default::default()
        }),
        &mut runs,
    );
    rig.bridge.dispatch(HostMessage::Run { check: false }, &mut runs);
    runs.join_next().await.unwrap().unwrap();
    sent(&mut rig);

    rig.bridge.dispatch(HostMessage::Logs, &mut runs);
    rig.bridge.dispatch(HostMessage::Logs, &mut runs);

    let replies = sent(&mut rig);
    let CoreMessage::Logs { snapshots, .. } = &replies[0] else {
        panic!("expected logs, got {:?}", replies[0]);
    };
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        replies[1],
        CoreMessage::Logs {
            changes: vec![],
            snapshots: vec![]
        }
    );
}

#[tokio::test]
async fn test_toggles_apply_to_sandbox() {
    let rig = rig();
    let mut runs = JoinSet::new();
    rig.bridge.dispatch(
        HostMessage::Initialise(InitialiseParams::default()),
        &mut runs,
    );

    rig.bridge
        .dispatch(HostMessage::ToggleRun { disable_run: true }, &mut runs);
    rig.bridge.dispatch(
        HostMessage::ToggleReadOnlyCode {
            read_only_code: true,
        },
        &mut runs,
    );

    assert!(!rig.bridge.sandbox().controls().run_enabled);
    assert!(rig.bridge.sandbox().is_read_only());
}

#[tokio::test]
async fn test_feedback_printed() {
    let rig = rig();
    let mut runs = JoinSet::new();
    rig.bridge.dispatch(
        HostMessage::Feedback {
            succeeded: false,
            message: "Not quite".to_string(),
        },
        &mut runs,
    );
    assert_eq!(rig.terminal.text(), "\x1b[31;1mNot quite\x1b[0m\r\n");
}

#[tokio::test]
async fn test_run_message_spawns_check() {
    let mut rig = rig();
    let mut runs = JoinSet::new();
    let init = line(json!({
        "type": "initialise",
        "uid": UID,
        "language": "python",
        "code": "x=1",
        "test": "checkerResult=str(x)",
    }));
    rig.bridge.handle_line(&init, &mut runs).unwrap();
    rig.bridge
        .handle_line(&line(json!({"type": "run", "uid": UID, "check": true})), &mut runs)
        .unwrap();

    let attempt = runs.join_next().await.unwrap().unwrap();

    assert_eq!(
        attempt,
        RunAttempt::Executed(RunOutcome::Completed {
            checker_result: Some("1".to_string())
        })
    );
    assert_eq!(
        sent(&mut rig),
        vec![
            CoreMessage::ConfirmInitialised,
            CoreMessage::Checker {
                result: "1".to_string()
            },
            CoreMessage::ToggleRun,
        ]
    );
}
