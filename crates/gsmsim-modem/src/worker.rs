//! Serialises all access to one [`SimulatedGsmCallState`] through a worker thread.
//!
//! Front ends hold a cloneable [`CallStateHandle`] and send [`CallCmd`] requests
//! to the worker. Auto-progress of connecting calls is scheduled on the same
//! worker: the loop sleeps on the command channel until the next progress
//! deadline, so timer-driven transitions and external requests never race.

use core::fmt;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use gsmsim_core::{CallId, DriverCall};

use crate::call_state::{ScheduledProgress, SimulatedGsmCallState};

/// Requests understood by the call state worker
#[derive(Debug)]
pub enum CallCmd {
    TriggerRing { number: String, reply: Sender<bool> },
    Dial { address: String, reply: Sender<bool> },
    Answer { reply: Sender<bool> },
    Hangup { reply: Sender<bool> },
    Chld { action: char, index: Option<char>, reply: Sender<bool> },
    HangupForeground { reply: Sender<bool> },
    HangupBackground { reply: Sender<bool> },
    HangupAll { reply: Sender<bool> },
    ProgressConnectingCallState { reply: Sender<()> },
    ProgressConnectingToActive { reply: Sender<()> },
    SetAutoProgress(bool),
    SetNextDialFailImmediately(bool),
    DriverCalls { reply: Sender<Vec<DriverCall>> },
    ClccLines { reply: Sender<Vec<String>> },
    Shutdown,
}

/// The worker behind a handle has stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStateClosed;

impl fmt::Display for CallStateClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call state worker has shut down")
    }
}

impl std::error::Error for CallStateClosed {}

/// Progress step waiting for its deadline. Ordered by deadline, then by
/// insertion so equal deadlines fire in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingProgress {
    due: Instant,
    seq: u64,
    slot: usize,
    id: CallId,
}

pub struct CallStateWorker {
    sim: SimulatedGsmCallState,
    command_receiver: Receiver<CallCmd>,
    timers: BinaryHeap<Reverse<PendingProgress>>,
    next_seq: u64,
}

impl CallStateWorker {
    pub fn new(sim: SimulatedGsmCallState, command_receiver: Receiver<CallCmd>) -> Self {
        Self {
            sim,
            command_receiver,
            timers: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Runs until a Shutdown command arrives or every handle is dropped
    pub fn run(&mut self) {
        tracing::info!("call state worker started");
        loop {
            self.fire_due_timers();

            let next_cmd = match self.timers.peek() {
                Some(Reverse(next)) => self.command_receiver.recv_deadline(next.due),
                None => self.command_receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let cmd = match next_cmd {
                Ok(cmd) => cmd,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("all call state handles dropped");
                    break;
                }
            };

            if !self.handle_command(cmd) {
                break;
            }
            self.collect_scheduled();
        }
        tracing::info!("call state worker stopped, {} pending progress steps dropped", self.timers.len());
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(next)) = self.timers.peek() {
            if next.due > now {
                break;
            }
            let next = *next;
            self.timers.pop();
            tracing::trace!(slot = next.slot + 1, "progress timer fired for call {}", next.id);
            self.sim.progress_call(next.slot, next.id);
            self.collect_scheduled();
        }
    }

    fn collect_scheduled(&mut self) {
        let now = Instant::now();
        for ScheduledProgress { slot, id, delay } in self.sim.take_scheduled() {
            self.timers.push(Reverse(PendingProgress {
                due: now + delay,
                seq: self.next_seq,
                slot,
                id,
            }));
            self.next_seq += 1;
        }
    }

    /// Returns false when the worker should stop
    fn handle_command(&mut self, cmd: CallCmd) -> bool {
        tracing::trace!("<- {:?}", cmd);

        // A dropped reply receiver only means the caller stopped waiting
        match cmd {
            CallCmd::TriggerRing { number, reply } => {
                let _ = reply.send(self.sim.trigger_ring(&number));
            }
            CallCmd::Dial { address, reply } => {
                let _ = reply.send(self.sim.on_dial(&address));
            }
            CallCmd::Answer { reply } => {
                let _ = reply.send(self.sim.on_answer());
            }
            CallCmd::Hangup { reply } => {
                let _ = reply.send(self.sim.on_hangup());
            }
            CallCmd::Chld { action, index, reply } => {
                let _ = reply.send(self.sim.on_chld(action, index));
            }
            CallCmd::HangupForeground { reply } => {
                let _ = reply.send(self.sim.trigger_hangup_foreground());
            }
            CallCmd::HangupBackground { reply } => {
                let _ = reply.send(self.sim.trigger_hangup_background());
            }
            CallCmd::HangupAll { reply } => {
                let _ = reply.send(self.sim.trigger_hangup_all());
            }
            CallCmd::ProgressConnectingCallState { reply } => {
                self.sim.progress_connecting_call_state();
                let _ = reply.send(());
            }
            CallCmd::ProgressConnectingToActive { reply } => {
                self.sim.progress_connecting_to_active();
                let _ = reply.send(());
            }
            CallCmd::SetAutoProgress(enable) => {
                self.sim.set_auto_progress_connecting_call(enable);
            }
            CallCmd::SetNextDialFailImmediately(enable) => {
                self.sim.set_next_dial_fail_immediately(enable);
            }
            CallCmd::DriverCalls { reply } => {
                let _ = reply.send(self.sim.driver_calls());
            }
            CallCmd::ClccLines { reply } => {
                let _ = reply.send(self.sim.clcc_lines());
            }
            CallCmd::Shutdown => return false,
        }
        true
    }
}

/// Cloneable front for a running [`CallStateWorker`]
#[derive(Debug, Clone)]
pub struct CallStateHandle {
    command_sender: Sender<CallCmd>,
}

impl CallStateHandle {
    /// Moves `sim` onto a new worker thread
    pub fn spawn(sim: SimulatedGsmCallState) -> std::io::Result<(Self, thread::JoinHandle<()>)> {
        let (command_sender, command_receiver) = unbounded::<CallCmd>();
        let handle = thread::Builder::new()
            .name("call-state-worker".to_string())
            .spawn(move || {
                let mut worker = CallStateWorker::new(sim, command_receiver);
                worker.run();
            })?;
        Ok((Self { command_sender }, handle))
    }

    fn post(&self, cmd: CallCmd) -> Result<(), CallStateClosed> {
        self.command_sender.send(cmd).map_err(|_| {
            tracing::warn!("call state worker is gone");
            CallStateClosed
        })
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> CallCmd) -> Result<T, CallStateClosed> {
        let (reply, reply_receiver) = bounded(1);
        self.post(make(reply))?;
        reply_receiver.recv().map_err(|_| CallStateClosed)
    }

    pub fn trigger_ring(&self, number: &str) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::TriggerRing { number: number.to_string(), reply })
    }

    pub fn on_dial(&self, address: &str) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::Dial { address: address.to_string(), reply })
    }

    pub fn on_answer(&self) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::Answer { reply })
    }

    pub fn on_hangup(&self) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::Hangup { reply })
    }

    pub fn on_chld(&self, action: char, index: Option<char>) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::Chld { action, index, reply })
    }

    pub fn trigger_hangup_foreground(&self) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::HangupForeground { reply })
    }

    pub fn trigger_hangup_background(&self) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::HangupBackground { reply })
    }

    pub fn trigger_hangup_all(&self) -> Result<bool, CallStateClosed> {
        self.request(|reply| CallCmd::HangupAll { reply })
    }

    pub fn progress_connecting_call_state(&self) -> Result<(), CallStateClosed> {
        self.request(|reply| CallCmd::ProgressConnectingCallState { reply })
    }

    pub fn progress_connecting_to_active(&self) -> Result<(), CallStateClosed> {
        self.request(|reply| CallCmd::ProgressConnectingToActive { reply })
    }

    pub fn set_auto_progress_connecting_call(&self, enable: bool) -> Result<(), CallStateClosed> {
        self.post(CallCmd::SetAutoProgress(enable))
    }

    pub fn set_next_dial_fail_immediately(&self, enable: bool) -> Result<(), CallStateClosed> {
        self.post(CallCmd::SetNextDialFailImmediately(enable))
    }

    pub fn driver_calls(&self) -> Result<Vec<DriverCall>, CallStateClosed> {
        self.request(|reply| CallCmd::DriverCalls { reply })
    }

    pub fn clcc_lines(&self) -> Result<Vec<String>, CallStateClosed> {
        self.request(|reply| CallCmd::ClccLines { reply })
    }

    /// Stops the worker. Pending progress steps are dropped.
    pub fn shutdown(&self) {
        let _ = self.post(CallCmd::Shutdown);
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use gsmsim_core::{CallState, debug};

    use super::*;

    #[test]
    fn test_timer_progresses_dial() {
        debug::setup_logging_verbose();
        let sim = SimulatedGsmCallState::new(true, Duration::from_millis(20));
        let (handle, join) = CallStateHandle::spawn(sim).unwrap();

        assert_eq!(handle.on_dial("+16505551212"), Ok(true));
        assert_eq!(handle.driver_calls().unwrap()[0].state, CallState::Dialing);

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.driver_calls().unwrap()[0].state != CallState::Active {
            assert!(Instant::now() < deadline, "call never became active");
            thread::sleep(Duration::from_millis(5));
        }

        handle.shutdown();
        join.join().unwrap();
        assert_eq!(handle.driver_calls(), Err(CallStateClosed));
    }

    #[test]
    fn test_hangup_before_timer() {
        let sim = SimulatedGsmCallState::new(true, Duration::from_millis(20));
        let (handle, join) = CallStateHandle::spawn(sim).unwrap();

        assert_eq!(handle.on_dial("1111"), Ok(true));
        assert_eq!(handle.trigger_hangup_all(), Ok(true));
        thread::sleep(Duration::from_millis(80));
        assert!(handle.driver_calls().unwrap().is_empty());

        drop(handle);
        join.join().unwrap();
    }

    #[test]
    fn test_setters_are_ordered() {
        let sim = SimulatedGsmCallState::new(true, Duration::from_millis(20));
        let (handle, _join) = CallStateHandle::spawn(sim).unwrap();

        handle.set_auto_progress_connecting_call(false).unwrap();
        handle.set_next_dial_fail_immediately(true).unwrap();
        assert_eq!(handle.on_dial("1111"), Ok(false));
        assert_eq!(handle.on_dial("1111"), Ok(true));

        thread::sleep(Duration::from_millis(60));
        assert_eq!(handle.clcc_lines().unwrap(), vec!["+CLCC: 1,0,2,0,0,\"1111\",129".to_string()]);

        handle.progress_connecting_to_active().unwrap();
        assert_eq!(handle.driver_calls().unwrap()[0].state, CallState::Active);
        handle.shutdown();
    }
}
