mod common;

use std::time::Duration;

use gsmsim_core::{CallState, debug};
use gsmsim_modem::CallStateClosed;

use common::{ModemTest, default_test_config, wait_until};

#[test]
fn test_auto_progress_reaches_active() {
    debug::setup_logging_verbose();
    let mut config = default_test_config();
    config.call_state.auto_progress = true;
    let test = ModemTest::new(config);

    assert_eq!(test.call_state.on_dial("+16505551212"), Ok(true));
    wait_until(Duration::from_secs(5), || {
        test.call_state.driver_calls().unwrap()[0].state == CallState::Active
    });
    assert_eq!(
        test.call_state.clcc_lines().unwrap(),
        vec!["+CLCC: 1,0,0,0,0,\"+16505551212\",145".to_string()]
    );
}

#[test]
fn test_stale_progress_leaves_new_call_alone() {
    debug::setup_logging_verbose();
    let mut config = default_test_config();
    config.call_state.auto_progress = true;
    config.call_state.connecting_pause_ms = 100;
    let test = ModemTest::new(config);

    // First call hung up while its progress step is pending, then the slot is
    // reused by a call that must not inherit that step
    assert_eq!(test.call_state.on_dial("5551000"), Ok(true));
    assert_eq!(test.call_state.trigger_hangup_all(), Ok(true));
    test.call_state.set_auto_progress_connecting_call(false).unwrap();
    assert_eq!(test.call_state.on_dial("5552000"), Ok(true));

    std::thread::sleep(Duration::from_millis(250));
    let calls = test.call_state.driver_calls().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].number, "5552000");
    assert_eq!(calls[0].state, CallState::Dialing);
}

#[test]
fn test_handles_share_state() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    let other = test.call_state.clone();

    let ringer = std::thread::spawn(move || other.trigger_ring("5551000"));
    assert_eq!(ringer.join().unwrap(), Ok(true));
    assert_eq!(test.call_state.on_answer(), Ok(true));
    assert_eq!(test.call_state.driver_calls().unwrap()[0].state, CallState::Active);
}

#[test]
fn test_requests_after_shutdown() {
    debug::setup_logging_verbose();
    let test = ModemTest::new(default_test_config());
    test.call_state.shutdown();

    assert_eq!(test.call_state.on_dial("5551000"), Err(CallStateClosed));
    assert_eq!(test.call_state.clcc_lines(), Err(CallStateClosed));
}
