mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gsmsim_core::{CallState, debug};
use gsmsim_modem::commands::{CALL_FAIL_BUSY, CALL_FAIL_CONGESTION, CALL_FAIL_NORMAL_CLEARING};
use gsmsim_modem::{CommandException, SimulatedRadioControl};

use common::{ModemTest, default_test_config};

#[test]
fn test_dial_and_current_calls() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    commands.dial("+1-650-555-1212").unwrap();
    commands.progress_connecting_call_state();
    let calls = commands.get_current_calls().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].index, 1);
    assert!(!calls[0].is_mt);
    assert_eq!(calls[0].state, CallState::Alerting);
    assert_eq!(calls[0].number, "+16505551212");

    // Second dial while the first is still connecting
    assert_eq!(commands.dial("5552000"), Err(CommandException::GenericFailure));
}

#[test]
fn test_accept_and_reject() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    assert_eq!(commands.accept_call(), Err(CommandException::GenericFailure));

    assert!(commands.trigger_ring("5551000"));
    commands.reject_call().unwrap();
    assert!(commands.get_current_calls().unwrap().is_empty());

    assert!(commands.trigger_ring("5551000"));
    commands.accept_call().unwrap();
    assert!(commands.trigger_ring("5552000"));
    let calls = commands.get_current_calls().unwrap();
    assert_eq!(calls[1].state, CallState::Waiting);

    // Answer the waiting call, putting the first on hold
    commands.switch_waiting_or_holding_and_active().unwrap();
    let states: Vec<CallState> = commands.get_current_calls().unwrap().iter().map(|c| c.state).collect();
    assert_eq!(states, vec![CallState::Holding, CallState::Active]);

    commands.hangup_foreground_resume_background().unwrap();
    let calls = commands.get_current_calls().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].number, "5551000");
    assert_eq!(calls[0].state, CallState::Active);
}

#[test]
fn test_conference_and_separate() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    assert!(commands.trigger_ring("5551000"));
    commands.accept_call().unwrap();
    commands.dial("5552000").unwrap();
    assert_eq!(commands.conference(), Err(CommandException::GenericFailure));
    commands.progress_connecting_to_active();
    commands.conference().unwrap();
    assert!(commands.get_current_calls().unwrap().iter().all(|c| c.is_mpty));

    commands.separate_connection(1).unwrap();
    let calls = commands.get_current_calls().unwrap();
    assert_eq!(calls[0].state, CallState::Active);
    assert_eq!(calls[1].state, CallState::Holding);

    assert_eq!(commands.separate_connection(0), Err(CommandException::InvalidArguments));
    commands.hangup_waiting_or_background().unwrap();
    assert_eq!(commands.get_current_calls().unwrap().len(), 1);

    commands.explicit_call_transfer().unwrap();
    assert!(commands.get_current_calls().unwrap().is_empty());
}

#[test]
fn test_hangup_connection() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    commands.dial("5551000").unwrap();
    assert_eq!(commands.hangup_connection(10), Err(CommandException::InvalidArguments));
    assert_eq!(commands.hangup_connection(9), Err(CommandException::GenericFailure));
    assert_eq!(commands.hangup_connection(2), Err(CommandException::GenericFailure));
    commands.hangup_connection(1).unwrap();
    assert!(commands.get_current_calls().unwrap().is_empty());
}

#[test]
fn test_last_call_fail_cause() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    assert_eq!(commands.last_call_fail_cause(), CALL_FAIL_NORMAL_CLEARING);
    commands.set_next_call_fail_cause(CALL_FAIL_BUSY);
    commands.set_next_dial_fail_immediately(true);
    assert_eq!(commands.dial("5551000"), Err(CommandException::GenericFailure));
    assert_eq!(commands.last_call_fail_cause(), CALL_FAIL_BUSY);

    // The cause sticks until replaced
    commands.set_next_call_fail_cause(CALL_FAIL_CONGESTION);
    commands.set_next_dial_fail_immediately(true);
    assert_eq!(commands.dial("5551001"), Err(CommandException::GenericFailure));
    assert_eq!(commands.last_call_fail_cause(), CALL_FAIL_CONGESTION);
}

#[test]
fn test_paused_responses_block_completion() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = Arc::new(test.commands());

    commands.pause_responses();
    let dialer = {
        let commands = Arc::clone(&commands);
        thread::spawn(move || commands.dial("5551000"))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!dialer.is_finished());

    commands.resume_responses();
    assert_eq!(dialer.join().unwrap(), Ok(()));
    assert_eq!(commands.get_current_calls().unwrap().len(), 1);
}

#[test]
fn test_radio_not_available_after_shutdown() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let commands = test.commands();

    commands.shutdown();
    assert_eq!(commands.dial("5551000"), Err(CommandException::RadioNotAvailable));
    assert_eq!(commands.get_current_calls(), Err(CommandException::RadioNotAvailable));
    assert!(!commands.trigger_ring("5551000"));
}
