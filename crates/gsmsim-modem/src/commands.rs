//! Method-call front end for the call-control subset of a radio interface.
//!
//! Each request maps onto one call-state operation, mostly by way of the
//! equivalent `AT+CHLD` action. A rejected operation is a
//! [`CommandException::GenericFailure`].

use core::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use gsmsim_core::DriverCall;

use crate::radio_control::{ResponseGate, SimulatedRadioControl};
use crate::worker::{CallStateClosed, CallStateHandle};

/// Cause codes reported by `last_call_fail_cause` (3GPP TS 24.008 10.5.4.11)
pub const CALL_FAIL_NORMAL_CLEARING: i32 = 16;
pub const CALL_FAIL_BUSY: i32 = 17;
pub const CALL_FAIL_CONGESTION: i32 = 34;

/// Highest call index the CHLD index digit can carry
const MAX_CALL_INDEX: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandException {
    GenericFailure,
    InvalidArguments,
    RadioNotAvailable,
}

impl fmt::Display for CommandException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandException::GenericFailure => write!(f, "generic failure"),
            CommandException::InvalidArguments => write!(f, "invalid arguments"),
            CommandException::RadioNotAvailable => write!(f, "radio not available"),
        }
    }
}

impl std::error::Error for CommandException {}

impl From<CallStateClosed> for CommandException {
    fn from(_: CallStateClosed) -> Self {
        CommandException::RadioNotAvailable
    }
}

pub struct SimulatedCommands {
    call_state: CallStateHandle,
    next_call_fail_cause: AtomicI32,
    gate: ResponseGate,
}

impl SimulatedCommands {
    pub fn new(call_state: CallStateHandle) -> Self {
        Self {
            call_state,
            next_call_fail_cause: AtomicI32::new(CALL_FAIL_NORMAL_CLEARING),
            gate: ResponseGate::default(),
        }
    }

    /// Waits out paused responses, then turns a rejected operation into GenericFailure
    fn complete(&self, op: &str, result: Result<bool, CallStateClosed>) -> Result<(), CommandException> {
        self.gate.wait_open();
        match result {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::info!("SC< {} rejected", op);
                Err(CommandException::GenericFailure)
            }
            Err(e) => {
                tracing::warn!("SC< {}: {}", op, e);
                Err(e.into())
            }
        }
    }

    fn chld(&self, op: &str, action: char, index: Option<char>) -> Result<(), CommandException> {
        self.complete(op, self.call_state.on_chld(action, index))
    }

    pub fn dial(&self, address: &str) -> Result<(), CommandException> {
        self.complete("dial", self.call_state.on_dial(address))
    }

    pub fn get_current_calls(&self) -> Result<Vec<DriverCall>, CommandException> {
        let calls = self.call_state.driver_calls();
        self.gate.wait_open();
        Ok(calls?)
    }

    pub fn accept_call(&self) -> Result<(), CommandException> {
        self.complete("accept_call", self.call_state.on_answer())
    }

    pub fn reject_call(&self) -> Result<(), CommandException> {
        self.chld("reject_call", '0', None)
    }

    /// Releases the call at 1-based `index`
    pub fn hangup_connection(&self, index: u32) -> Result<(), CommandException> {
        let digit = index_digit(index)?;
        self.chld("hangup_connection", '1', Some(digit))
    }

    pub fn hangup_waiting_or_background(&self) -> Result<(), CommandException> {
        self.chld("hangup_waiting_or_background", '0', None)
    }

    pub fn hangup_foreground_resume_background(&self) -> Result<(), CommandException> {
        self.chld("hangup_foreground_resume_background", '1', None)
    }

    pub fn switch_waiting_or_holding_and_active(&self) -> Result<(), CommandException> {
        self.chld("switch_waiting_or_holding_and_active", '2', None)
    }

    /// Splits the call at 1-based `index` out of the conference
    pub fn separate_connection(&self, index: u32) -> Result<(), CommandException> {
        let digit = index_digit(index)?;
        self.chld("separate_connection", '2', Some(digit))
    }

    pub fn conference(&self) -> Result<(), CommandException> {
        self.chld("conference", '3', None)
    }

    pub fn explicit_call_transfer(&self) -> Result<(), CommandException> {
        self.chld("explicit_call_transfer", '4', None)
    }

    pub fn last_call_fail_cause(&self) -> i32 {
        self.next_call_fail_cause.load(Ordering::SeqCst)
    }
}

fn index_digit(index: u32) -> Result<char, CommandException> {
    if !(1..=MAX_CALL_INDEX).contains(&index) {
        tracing::warn!("call index {} out of range", index);
        return Err(CommandException::InvalidArguments);
    }
    char::from_digit(index, 10).ok_or(CommandException::InvalidArguments)
}

impl SimulatedRadioControl for SimulatedCommands {
    fn trigger_ring(&self, number: &str) -> bool {
        self.call_state.trigger_ring(number).unwrap_or(false)
    }

    fn progress_connecting_call_state(&self) {
        let _ = self.call_state.progress_connecting_call_state();
    }

    fn progress_connecting_to_active(&self) {
        let _ = self.call_state.progress_connecting_to_active();
    }

    fn set_auto_progress_connecting_call(&self, enable: bool) {
        let _ = self.call_state.set_auto_progress_connecting_call(enable);
    }

    fn set_next_dial_fail_immediately(&self, enable: bool) {
        let _ = self.call_state.set_next_dial_fail_immediately(enable);
    }

    fn set_next_call_fail_cause(&self, cause: i32) {
        self.next_call_fail_cause.store(cause, Ordering::SeqCst);
    }

    fn trigger_hangup_foreground(&self) -> bool {
        self.call_state.trigger_hangup_foreground().unwrap_or(false)
    }

    fn trigger_hangup_background(&self) -> bool {
        self.call_state.trigger_hangup_background().unwrap_or(false)
    }

    fn trigger_hangup_all(&self) -> bool {
        self.call_state.trigger_hangup_all().unwrap_or(false)
    }

    fn trigger_incoming_sms(&self, message: &str) {
        gsmsim_core::unimplemented_log!("incoming SMS delivery ({} chars)", message.len());
    }

    fn pause_responses(&self) {
        self.gate.pause();
    }

    fn resume_responses(&self) {
        self.gate.resume();
    }

    fn shutdown(&self) {
        self.call_state.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_digit() {
        assert_eq!(index_digit(1), Ok('1'));
        assert_eq!(index_digit(9), Ok('9'));
        assert_eq!(index_digit(0), Err(CommandException::InvalidArguments));
        assert_eq!(index_digit(10), Err(CommandException::InvalidArguments));
    }
}
