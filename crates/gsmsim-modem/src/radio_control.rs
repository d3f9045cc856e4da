use std::sync::{Condvar, Mutex, PoisonError};

/// Control surface shared by the simulated front ends. Tests drive the
/// network side of a call through it regardless of which front end the
/// phone side talks to.
pub trait SimulatedRadioControl {
    /// Network-originated call. Returns whether the call was accepted.
    fn trigger_ring(&self, number: &str) -> bool;

    fn progress_connecting_call_state(&self);

    fn progress_connecting_to_active(&self);

    fn set_auto_progress_connecting_call(&self, enable: bool);

    fn set_next_dial_fail_immediately(&self, enable: bool);

    fn set_next_call_fail_cause(&self, cause: i32);

    /// Remote hangup of ringing, connecting and active calls
    fn trigger_hangup_foreground(&self) -> bool;

    /// Remote hangup of held calls
    fn trigger_hangup_background(&self) -> bool;

    fn trigger_hangup_all(&self) -> bool;

    fn trigger_incoming_sms(&self, message: &str);

    /// Responses are held back until a matching `resume_responses`.
    /// Calls nest.
    fn pause_responses(&self);

    fn resume_responses(&self);

    fn shutdown(&self);
}

/// Counting gate behind `pause_responses` / `resume_responses`
#[derive(Debug, Default)]
pub struct ResponseGate {
    paused: Mutex<u32>,
    resumed: Condvar,
}

impl ResponseGate {
    pub fn pause(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *paused += 1;
        tracing::debug!("responses paused ({})", *paused);
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        if *paused == 0 {
            tracing::warn!("resume_responses without matching pause");
            return;
        }
        *paused -= 1;
        tracing::debug!("responses resumed ({})", *paused);
        if *paused == 0 {
            self.resumed.notify_all();
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) > 0
    }

    /// Blocks while the gate is paused
    pub fn wait_open(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *paused > 0 {
            paused = self.resumed.wait(paused).unwrap_or_else(PoisonError::into_inner);
        }
    }
}
