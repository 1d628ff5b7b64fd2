//! Unit Tests for the Session Controller
//!
//! Exercises lifecycle transitions, the HELLO handshake, stop-event routing
//! and the sync/ack exchange without any transport or storage I/O.

use beltwatch_core::{
    channel::{AppEvent, Effect},
    protocol::OutboundCommand,
    session::NO_SYNC_INDEX,
    store::keys,
    types::FixedTimeSource,
    ConfigSnapshot, ConnectionPhase, DeviceHandle, Session, SessionError, SessionOptions,
    StopEvent, SyncStatus, Thresholds,
};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const NOW: i64 = 1_700_000_000;
const HELLO: &[u8] = b"HELLO,BS-0042,FW,1.4.2,1,3,3710,88\n";

fn create_session(auto_push_thresholds: bool) -> Session {
    let config = ConfigSnapshot {
        tz_offset_minutes: 60,
        ..Default::default()
    };
    Session::new(
        config,
        SessionOptions {
            auto_push_thresholds,
        },
        Box::new(FixedTimeSource(NOW)),
    )
}

fn create_test_device() -> DeviceHandle {
    DeviceHandle {
        address: "AA:BB:CC:DD:EE:FF".to_string(),
        name: Some("BeltStop-42".to_string()),
    }
}

fn connected_session(auto_push_thresholds: bool) -> Session {
    let mut session = create_session(auto_push_thresholds);
    session.begin_connect().expect("fresh session can connect");
    session.connected(create_test_device());
    session
}

fn sent_commands(effects: &[Effect]) -> Vec<OutboundCommand> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Send(command) => Some(*command),
            _ => None,
        })
        .collect()
}

fn sent_lines(effects: &[Effect]) -> Vec<String> {
    sent_commands(effects).iter().map(|c| c.to_line()).collect()
}

// ----------------------------------------------------------------------------
// Lifecycle Tests
// ----------------------------------------------------------------------------

#[test]
fn test_new_session_is_disconnected() {
    let session = create_session(true);
    assert_eq!(session.phase(), ConnectionPhase::Disconnected);
    assert_eq!(session.state().last_sync_acked_index, NO_SYNC_INDEX);
    assert_eq!(session.sync_status(), SyncStatus::Idle);
}

#[test]
fn test_connect_sends_nothing_until_hello() {
    let mut session = create_session(true);
    session.begin_connect().unwrap();
    assert_eq!(session.phase(), ConnectionPhase::Connecting);

    let effects = session.connected(create_test_device());
    assert_eq!(session.phase(), ConnectionPhase::Connected);
    assert!(sent_commands(&effects).is_empty());
    assert!(matches!(effects.as_slice(), [Effect::Notify(AppEvent::Connected(_))]));
}

#[test]
fn test_begin_connect_twice_is_rejected() {
    let mut session = create_session(true);
    session.begin_connect().unwrap();
    assert!(matches!(
        session.begin_connect(),
        Err(SessionError::AlreadyActive { .. })
    ));
}

#[test]
fn test_connect_failure_returns_to_disconnected() {
    let mut session = create_session(true);
    session.begin_connect().unwrap();

    let effects = session.connect_failed("characteristic not found");
    assert_eq!(session.phase(), ConnectionPhase::Disconnected);
    assert_eq!(
        effects,
        vec![Effect::Notify(AppEvent::ConnectFailed {
            reason: "characteristic not found".to_string()
        })]
    );
    // a fresh attempt is allowed after a failure
    assert!(session.begin_connect().is_ok());
}

#[test]
fn test_disconnect_blocks_user_actions_until_reconnected() {
    let mut session = connected_session(true);
    session.disconnected("link lost");
    assert_eq!(session.phase(), ConnectionPhase::Disconnected);

    assert_eq!(session.send_time_only(), Err(SessionError::NotConnected));
    assert_eq!(session.request_sync(), Err(SessionError::NotConnected));
    assert_eq!(
        session.send_thresholds(Thresholds::default()),
        Err(SessionError::NotConnected)
    );
    assert_eq!(session.set_calibration(true), Err(SessionError::NotConnected));

    session.begin_connect().unwrap();
    session.connected(create_test_device());
    assert!(session.send_time_only().is_ok());
}

#[test]
fn test_disconnect_when_already_disconnected_is_silent() {
    let mut session = create_session(true);
    assert!(session.disconnected("again").is_empty());
}

#[test]
fn test_data_after_disconnect_is_dropped() {
    let mut session = connected_session(true);
    session.disconnected("link lost");
    assert!(session.on_data(HELLO).is_empty());
}

#[test]
fn test_partial_line_does_not_survive_reconnect() {
    let mut session = connected_session(true);
    assert!(session.on_data(b"EV,17000").is_empty());
    session.disconnected("link lost");

    session.begin_connect().unwrap();
    session.connected(create_test_device());
    let effects = session.on_data(b"00000,4523,17\n");
    assert!(effects.is_empty());
}

// ----------------------------------------------------------------------------
// Handshake Tests
// ----------------------------------------------------------------------------

#[test]
fn test_hello_pushes_config_in_fixed_order() {
    let mut session = connected_session(true);
    let effects = session.on_data(HELLO);

    assert_eq!(
        sent_lines(&effects),
        vec![
            format!("TIME,UTC,{},60\n", NOW),
            "CFG,SCHED,420,1020,1\n".to_string(),
            "CFG,BREAKS,600,615,720,750,1\n".to_string(),
            "CFG,THRESH,0.05,0.01,3,2\n".to_string(),
        ]
    );
    assert_eq!(session.shift_total(), Some(88));
    assert_eq!(session.last_hello().map(|h| h.battery_mv), Some(3710));
}

#[test]
fn test_hello_without_threshold_push() {
    let mut session = connected_session(false);
    let commands = sent_commands(&session.on_data(HELLO));
    assert_eq!(commands.len(), 3);
    assert!(!commands
        .iter()
        .any(|c| matches!(c, OutboundCommand::Thresholds(_))));
}

#[test]
fn test_hello_split_across_chunks() {
    let mut session = connected_session(true);
    let (head, tail) = HELLO.split_at(11);
    assert!(session.on_data(head).is_empty());
    assert_eq!(sent_commands(&session.on_data(tail)).len(), 4);
}

// ----------------------------------------------------------------------------
// Stop Event Tests
// ----------------------------------------------------------------------------

#[test]
fn test_event_is_stored_with_device_id() {
    let mut session = connected_session(true);
    session.on_data(HELLO);

    let effects = session.on_data(b"EV,1700000000,4523,17\n");
    let expected = StopEvent::new(1_700_000_000, 4523, "BS-0042", Some(17));
    assert_eq!(effects, vec![Effect::StoreEvent(expected.clone())]);
    assert_eq!(session.last_stop(), Some(&expected));
    assert_eq!(session.shift_total(), Some(17));
}

#[test]
fn test_short_event_line_is_ignored() {
    let mut session = connected_session(true);
    assert!(session.on_data(b"EV,1700000000\n").is_empty());
    assert!(session.last_stop().is_none());
}

#[test]
fn test_lines_in_one_chunk_are_processed_in_order() {
    let mut session = connected_session(true);
    let effects = session.on_data(b"EV,100,1,1\nEV,200,2,2\nEV,300,3,3\n");
    let starts: Vec<i64> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::StoreEvent(event) => Some(event.start_epoch_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![100, 200, 300]);
}

#[test]
fn test_calibration_telemetry_is_reported() {
    let mut session = connected_session(true);
    let effects = session.on_data(b"CAL,notanumber\nCAL,0.42\n");
    assert_eq!(effects.len(), 2);
    assert!(matches!(
        &effects[0],
        Effect::Notify(AppEvent::Calibration(c)) if c.vibration_g == 0.0
    ));
    assert_eq!(session.status().calibration.map(|c| c.vibration_g), Some(0.42));
}

// ----------------------------------------------------------------------------
// Sync Tests
// ----------------------------------------------------------------------------

#[test]
fn test_sync_done_acks_exactly_once() {
    let mut session = connected_session(true);
    session.request_sync().unwrap();
    assert_eq!(session.sync_status(), SyncStatus::Pending);

    let effects = session.on_data(b"SYNC,DONE,42\n");
    assert_eq!(sent_lines(&effects), vec!["SYNC,ACK,42\n".to_string()]);
    assert_eq!(session.state().last_sync_acked_index, 42);
    assert_eq!(session.sync_status(), SyncStatus::Complete { last_index: 42 });
    assert!(effects.contains(&Effect::PersistSetting {
        key: keys::LAST_SYNC_INDEX.to_string(),
        value: "42".to_string(),
    }));
}

#[test]
fn test_request_sync_sends_request() {
    let mut session = connected_session(true);
    let effects = session.request_sync().unwrap();
    assert_eq!(sent_lines(&effects), vec!["SYNC,REQ\n".to_string()]);
}

#[test]
fn test_disconnect_during_sync_marks_incomplete() {
    let mut session = connected_session(true);
    session.request_sync().unwrap();

    let effects = session.disconnected("link lost");
    assert_eq!(session.sync_status(), SyncStatus::Incomplete);
    assert!(effects.contains(&Effect::Notify(AppEvent::SyncIncomplete)));
}

#[test]
fn test_undelivered_sync_request_marks_incomplete() {
    let mut session = connected_session(true);
    session.request_sync().unwrap();

    let effects = session.command_failed(&OutboundCommand::SyncRequest);
    assert_eq!(effects, vec![Effect::Notify(AppEvent::SyncIncomplete)]);
    assert_eq!(session.sync_status(), SyncStatus::Incomplete);
    assert_eq!(session.phase(), ConnectionPhase::Connected);

    // a fresh request is allowed afterwards
    session.request_sync().unwrap();
    assert_eq!(session.sync_status(), SyncStatus::Pending);
}

#[test]
fn test_other_failed_writes_leave_sync_alone() {
    let mut session = connected_session(true);
    session.request_sync().unwrap();

    assert!(session.command_failed(&OutboundCommand::Calibration(true)).is_empty());
    assert!(session
        .command_failed(&OutboundCommand::SyncAck { index: 3 })
        .is_empty());
    assert_eq!(session.sync_status(), SyncStatus::Pending);
}

#[test]
fn test_restored_sync_index() {
    let session = create_session(true).with_last_sync_index(17);
    assert_eq!(session.state().last_sync_acked_index, 17);
}

// ----------------------------------------------------------------------------
// User Action Tests
// ----------------------------------------------------------------------------

#[test]
fn test_send_thresholds_updates_snapshot_and_persists() {
    let mut session = connected_session(true);
    let thresholds = Thresholds {
        threshold_g: 0.2,
        hysteresis_g: 0.05,
        seconds_down: 5,
        seconds_up: 4,
    };

    let effects = session.send_thresholds(thresholds).unwrap();
    assert_eq!(session.config().thresholds, thresholds);
    assert_eq!(sent_lines(&effects), vec!["CFG,THRESH,0.2,0.05,5,4\n".to_string()]);
    assert!(effects.iter().any(|e| matches!(
        e,
        Effect::PersistSetting { key, .. } if key == keys::THRESHOLDS
    )));

    // the next HELLO pushes the updated values
    let commands = sent_commands(&session.on_data(HELLO));
    assert_eq!(commands.last(), Some(&OutboundCommand::Thresholds(thresholds)));
}

#[test]
fn test_send_time_only_uses_tz_offset() {
    let mut session = connected_session(true);
    session.set_tz_offset_minutes(-300);
    let effects = session.send_time_only().unwrap();
    assert_eq!(
        sent_commands(&effects),
        vec![OutboundCommand::Time {
            epoch_seconds: NOW,
            tz_offset_minutes: -300
        }]
    );
}

#[test]
fn test_calibration_toggle() {
    let mut session = connected_session(true);
    let on = session.set_calibration(true).unwrap();
    let off = session.set_calibration(false).unwrap();
    assert_eq!(sent_lines(&on), vec!["MODE,CALIB,ON\n".to_string()]);
    assert_eq!(sent_lines(&off), vec!["MODE,CALIB,OFF\n".to_string()]);
}
