use core::fmt;
use std::time::Duration;

use gsmsim_config::CfgCallState;
use gsmsim_core::phone_number::{extract_network_portion, is_gprs_dial_string};
use gsmsim_core::{CallId, CallInfo, CallState, DriverCall, unimplemented_log};

/// Number of call slots. Slot n is reported as call index n + 1.
pub const MAX_CALLS: usize = 7;

/// Default pause between the Dialing -> Alerting -> Active steps
pub const CONNECTING_PAUSE: Duration = Duration::from_millis(500);

/// Bookkeeping inconsistency found while counting active lines.
/// Callers treat it like a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidStateErr {
    /// A conference member is active while an earlier member is held
    SplitConference,
    /// A private call is held next to a held conference
    HeldBesideHeldConference,
}

impl fmt::Display for InvalidStateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidStateErr::SplitConference => write!(f, "conference is partly active and partly held"),
            InvalidStateErr::HeldBesideHeldConference => write!(f, "private call held next to held conference"),
        }
    }
}

impl std::error::Error for InvalidStateErr {}

/// A connecting call that should be progressed once `delay` has passed.
/// Produced by the state machine, executed by whoever owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledProgress {
    pub slot: usize,
    pub id: CallId,
    pub delay: Duration,
}

/// Call-control state of a simulated GSM modem.
///
/// Mimics the behaviour a baseband exposes through ATD/ATA/ATH and the
/// +CHLD supplementary service codes of 3GPP TS 22.030 6.5.5. All requests
/// report success or rejection as a plain bool, there is no retry.
///
/// The machine does not own a clock. Delayed transitions are queued as
/// [`ScheduledProgress`] items; the owner drains them with
/// [`take_scheduled`](Self::take_scheduled) and calls
/// [`progress_call`](Self::progress_call) when they are due.
#[derive(Debug)]
pub struct SimulatedGsmCallState {
    calls: [Option<CallInfo>; MAX_CALLS],
    auto_progress_connecting: bool,
    /// One-shot, cleared by the next dial attempt
    next_dial_fail_immediately: bool,
    connecting_pause: Duration,
    next_call_id: CallId,
    scheduled: Vec<ScheduledProgress>,
}

impl Default for SimulatedGsmCallState {
    fn default() -> Self {
        Self::new(true, CONNECTING_PAUSE)
    }
}

impl SimulatedGsmCallState {
    pub fn new(auto_progress_connecting: bool, connecting_pause: Duration) -> Self {
        Self {
            calls: Default::default(),
            auto_progress_connecting,
            next_dial_fail_immediately: false,
            connecting_pause,
            next_call_id: 1,
            scheduled: Vec::new(),
        }
    }

    pub fn from_config(cfg: &CfgCallState) -> Self {
        Self::new(cfg.auto_progress, cfg.connecting_pause())
    }

    /// Call in the given 0-based slot
    pub fn call_at(&self, slot: usize) -> Option<&CallInfo> {
        self.calls.get(slot).and_then(Option::as_ref)
    }

    pub fn call_count(&self) -> usize {
        self.calls.iter().flatten().count()
    }

    /// Drains the delayed progress requests queued since the last call
    pub fn take_scheduled(&mut self) -> Vec<ScheduledProgress> {
        std::mem::take(&mut self.scheduled)
    }

    pub fn set_auto_progress_connecting_call(&mut self, enable: bool) {
        self.auto_progress_connecting = enable;
    }

    pub fn set_next_dial_fail_immediately(&mut self, enable: bool) {
        self.next_dial_fail_immediately = enable;
    }

    fn alloc_call_id(&mut self) -> CallId {
        let id = self.next_call_id;
        self.next_call_id = self.next_call_id.wrapping_add(1).max(1);
        id
    }

    fn schedule_progress(&mut self, slot: usize, id: CallId) {
        if self.auto_progress_connecting {
            self.scheduled.push(ScheduledProgress {
                slot,
                id,
                delay: self.connecting_pause,
            });
        }
    }

    /// Clears every call matching `pred`. Returns whether anything was cleared.
    fn clear_where(&mut self, pred: impl Fn(&CallInfo) -> bool) -> bool {
        let mut found = false;
        for (slot, entry) in self.calls.iter_mut().enumerate() {
            if entry.as_ref().is_some_and(&pred) {
                tracing::debug!(slot = slot + 1, "clearing call");
                *entry = None;
                found = true;
            }
        }
        if found {
            self.dissolve_lone_conference();
        }
        found
    }

    /// A conference of one is not a conference
    fn dissolve_lone_conference(&mut self) {
        let mut mpty = self.calls.iter_mut().flatten().filter(|c| c.multiparty);
        if let (Some(last), None) = (mpty.next(), mpty.next()) {
            last.multiparty = false;
        }
    }

    fn any_call(&self, pred: impl Fn(&CallInfo) -> bool) -> bool {
        self.calls.iter().flatten().any(pred)
    }

    /// Incoming call from the network. Fails while another call is ringing
    /// or when no slot is free. Becomes Waiting when any other call exists.
    pub fn trigger_ring(&mut self, number: &str) -> bool {
        let mut empty = None;
        let mut is_call_waiting = false;

        for (slot, entry) in self.calls.iter().enumerate() {
            match entry {
                None => {
                    if empty.is_none() {
                        empty = Some(slot);
                    }
                }
                Some(call) if call.state.is_ringing() => {
                    tracing::warn!("trigger_ring failed; phone already ringing");
                    return false;
                }
                Some(_) => is_call_waiting = true,
            }
        }

        let Some(empty) = empty else {
            tracing::warn!("trigger_ring failed; all call slots in use");
            return false;
        };

        let id = self.alloc_call_id();
        let mut call = CallInfo::incoming(id, extract_network_portion(number));
        if is_call_waiting {
            call.state = CallState::Waiting;
        }
        tracing::debug!(slot = empty + 1, "SC< ring '{}' {:?}", call.number, call.state);
        self.calls[empty] = Some(call);
        true
    }

    /// Advances the first connecting call by one step
    pub fn progress_connecting_call_state(&mut self) {
        let mut reschedule = None;
        for (slot, call) in self.calls.iter_mut().enumerate() {
            let Some(call) = call else { continue };
            match call.state {
                CallState::Dialing => {
                    call.state = CallState::Alerting;
                    reschedule = Some((slot, call.id));
                    break;
                }
                CallState::Alerting => {
                    call.state = CallState::Active;
                    break;
                }
                _ => {}
            }
        }
        if let Some((slot, id)) = reschedule {
            self.schedule_progress(slot, id);
        }
    }

    /// Timer-driven step for one specific call. A no-op when the slot was
    /// cleared or reused since the step was scheduled.
    pub fn progress_call(&mut self, slot: usize, id: CallId) {
        let Some(call) = self.calls.get_mut(slot).and_then(Option::as_mut) else {
            tracing::trace!(slot = slot + 1, "progress for call {} dropped, slot empty", id);
            return;
        };
        if call.id != id {
            tracing::trace!(slot = slot + 1, "progress for call {} dropped, slot reused", id);
            return;
        }
        match call.state {
            CallState::Dialing => {
                call.state = CallState::Alerting;
                tracing::debug!(slot = slot + 1, "call {} alerting", id);
                self.schedule_progress(slot, id);
            }
            CallState::Alerting => {
                call.state = CallState::Active;
                tracing::debug!(slot = slot + 1, "call {} active", id);
            }
            _ => {}
        }
    }

    /// First connecting call goes straight to Active
    pub fn progress_connecting_to_active(&mut self) {
        if let Some(call) = self.calls.iter_mut().flatten().find(|c| c.state.is_connecting()) {
            call.state = CallState::Active;
        }
    }

    /// Clears ringing, connecting and active calls
    pub fn trigger_hangup_foreground(&mut self) -> bool {
        let mut found = self.clear_where(|c| c.state.is_ringing());
        found |= self.clear_where(|c| c.state.is_connecting() || c.state == CallState::Active);
        found
    }

    /// Clears held calls
    pub fn trigger_hangup_background(&mut self) -> bool {
        self.clear_where(|c| c.state == CallState::Holding)
    }

    pub fn trigger_hangup_all(&mut self) -> bool {
        self.clear_where(|_| true)
    }

    /// ATA. Only valid while a call is ringing.
    pub fn on_answer(&mut self) -> bool {
        if self.any_call(|c| c.state.is_ringing()) {
            return self.switch_active_and_held_or_waiting();
        }
        false
    }

    /// ATH. Releases every call except a waiting one.
    pub fn on_hangup(&mut self) -> bool {
        self.clear_where(|c| c.state != CallState::Waiting)
    }

    /// ATD. Rejected on a requested one-shot failure, an empty number, more
    /// than one line in use, a ringing or connecting call, or no free slot.
    /// Active calls are put on hold only once the dial is accepted.
    pub fn on_dial(&mut self, address: &str) -> bool {
        tracing::debug!("SC> dial '{}'", address);

        if self.next_dial_fail_immediately {
            self.next_dial_fail_immediately = false;
            tracing::debug!("SC< dial fail (per request)");
            return false;
        }

        let number = extract_network_portion(address);
        if number.is_empty() {
            tracing::debug!("SC< dial fail (invalid ph num)");
            return false;
        }

        if is_gprs_dial_string(&number) {
            tracing::debug!("SC< dial ignored (gprs)");
            return true;
        }

        // At most one line may be in use when a new call is started
        match self.count_active_lines() {
            Ok(lines) if lines > 1 => {
                tracing::debug!("SC< dial fail (invalid call state, {} lines)", lines);
                return false;
            }
            Err(e) => {
                tracing::debug!("SC< dial fail (invalid call state, {})", e);
                return false;
            }
            Ok(_) => {}
        }

        // No outgoing call while another one is ringing or connecting
        if self.any_call(|c| !c.state.is_active_or_held()) {
            tracing::debug!("SC< dial fail (invalid call state)");
            return false;
        }

        let Some(free_slot) = self.calls.iter().position(Option::is_none) else {
            tracing::debug!("SC< dial fail (no free slot)");
            return false;
        };

        for call in self.calls.iter_mut().flatten() {
            if call.state == CallState::Active {
                call.state = CallState::Holding;
            }
        }

        let id = self.alloc_call_id();
        self.calls[free_slot] = Some(CallInfo::outgoing(id, number));
        self.schedule_progress(free_slot, id);

        tracing::debug!(slot = free_slot + 1, "SC< dial");
        true
    }

    /// +CHLD=<action>[<index>]. `index` is the 1-based call index digit.
    pub fn on_chld(&mut self, action: char, index: Option<char>) -> bool {
        let slot = match index {
            None => None,
            Some(c) => match c.to_digit(10) {
                Some(d) if d >= 1 && (d as usize) <= MAX_CALLS => Some(d as usize - 1),
                _ => return false,
            },
        };

        match (action, slot) {
            ('0', _) => self.release_held_or_udub(),
            ('1', None) => self.release_active_accept_held_or_waiting(),
            ('1', Some(slot)) => self.release_call(slot),
            ('2', None) => self.switch_active_and_held_or_waiting(),
            ('2', Some(slot)) => self.separate_call(slot),
            ('3', _) => self.conference(),
            ('4', _) => self.explicit_call_transfer(),
            ('5', _) => {
                unimplemented_log!("CHLD=5 (CCBS)");
                false
            }
            _ => false,
        }
    }

    fn release_call(&mut self, slot: usize) -> bool {
        match self.calls[slot].take() {
            Some(_) => {
                tracing::debug!(slot = slot + 1, "released call");
                self.dissolve_lone_conference();
                true
            }
            None => false,
        }
    }

    /// CHLD=0. Rejects the ringing call (UDUB), or releases all held calls.
    pub fn release_held_or_udub(&mut self) -> bool {
        if let Some(slot) = self.calls.iter().position(|e| e.as_ref().is_some_and(|c| c.state.is_ringing())) {
            self.calls[slot] = None;
        } else {
            self.clear_where(|c| c.state == CallState::Holding);
        }
        true
    }

    /// CHLD=1. Releases active calls (or connecting ones if none are active),
    /// then resumes held calls, or else answers the ringing call.
    pub fn release_active_accept_held_or_waiting(&mut self) -> bool {
        if !self.clear_where(|c| c.state == CallState::Active) {
            self.clear_where(|c| c.state.is_connecting());
        }

        let mut found_held = false;
        for call in self.calls.iter_mut().flatten() {
            if call.state == CallState::Holding {
                call.state = CallState::Active;
                found_held = true;
            }
        }
        if found_held {
            return true;
        }

        if let Some(call) = self.calls.iter_mut().flatten().find(|c| c.state.is_ringing()) {
            call.state = CallState::Active;
        }
        true
    }

    /// CHLD=2. Swaps active and held calls. Without held calls the ringing
    /// call is answered instead.
    pub fn switch_active_and_held_or_waiting(&mut self) -> bool {
        let has_held = self.any_call(|c| c.state == CallState::Holding);

        for call in self.calls.iter_mut().flatten() {
            match call.state {
                CallState::Active => call.state = CallState::Holding,
                CallState::Holding => call.state = CallState::Active,
                s if !has_held && s.is_ringing() => call.state = CallState::Active,
                _ => {}
            }
        }
        true
    }

    /// CHLD=2x. Splits the call in `slot` off as a private active call and
    /// holds the rest. Only valid while exactly one line is in use.
    pub fn separate_call(&mut self, slot: usize) -> bool {
        let lines = match self.count_active_lines() {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!("separate_call rejected: {}", e);
                return false;
            }
        };

        match self.calls.get(slot) {
            Some(Some(call)) if !call.state.is_connecting() && lines == 1 => {}
            _ => return false,
        }

        for (i, call) in self.calls.iter_mut().enumerate() {
            let Some(call) = call else { continue };
            if i == slot {
                call.state = CallState::Active;
                call.multiparty = false;
            } else if call.state == CallState::Active {
                call.state = CallState::Holding;
            }
        }

        self.dissolve_lone_conference();
        true
    }

    /// CHLD=3. Joins every call into one active conference.
    /// A lone call becomes Active but is not marked multiparty.
    pub fn conference(&mut self) -> bool {
        if self.any_call(|c| c.state.is_connecting()) {
            return false;
        }

        let join = self.call_count() > 1;
        for call in self.calls.iter_mut().flatten() {
            call.state = CallState::Active;
            call.multiparty = join;
        }
        true
    }

    /// CHLD=4. Bridges the parties and drops out, i.e. all calls end here.
    pub fn explicit_call_transfer(&mut self) -> bool {
        if self.any_call(|c| c.state.is_connecting()) {
            return false;
        }
        self.trigger_hangup_all()
    }

    /// Counts the distinct line categories in use: held, active, connecting
    /// and ringing.
    pub fn count_active_lines(&self) -> Result<usize, InvalidStateErr> {
        let mut has_mpty = false;
        let mut has_held = false;
        let mut has_active = false;
        let mut has_connecting = false;
        let mut has_ringing = false;
        let mut mpty_is_held = false;

        for call in self.calls.iter().flatten() {
            if !has_mpty && call.multiparty {
                mpty_is_held = call.state == CallState::Holding;
            } else if call.multiparty && mpty_is_held && call.state == CallState::Active {
                tracing::error!("invalid call state: {}", InvalidStateErr::SplitConference);
                return Err(InvalidStateErr::SplitConference);
            } else if !call.multiparty && has_mpty && mpty_is_held && call.state == CallState::Holding {
                tracing::error!("invalid call state: {}", InvalidStateErr::HeldBesideHeldConference);
                return Err(InvalidStateErr::HeldBesideHeldConference);
            }

            has_mpty |= call.multiparty;
            has_held |= call.state == CallState::Holding;
            has_active |= call.state == CallState::Active;
            has_connecting |= call.state.is_connecting();
            has_ringing |= call.state.is_ringing();
        }

        Ok([has_held, has_active, has_connecting, has_ringing].iter().filter(|&&x| x).count())
    }

    pub fn driver_calls(&self) -> Vec<DriverCall> {
        let ret: Vec<DriverCall> = self
            .calls
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| c.to_driver_call(slot + 1)))
            .collect();
        tracing::trace!("SC< driver_calls {:?}", ret);
        ret
    }

    pub fn clcc_lines(&self) -> Vec<String> {
        self.calls
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| c.to_clcc_line(slot + 1)))
            .collect()
    }
}
