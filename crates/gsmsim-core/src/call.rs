use core::fmt;

/// Serial assigned to every call leg when it is created. Lets a delayed
/// progress event tell whether a slot still holds the call it was scheduled for.
pub type CallId = u32;

/// Direction of call initiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    /// Dialed from this side. Also known as an outgoing call.
    MobileOriginated,
    /// Terminated on this side. Also known as an incoming call.
    MobileTerminated,
}

impl CallDirection {
    /// `<dir>` field of a +CLCC line
    pub fn into_raw(self) -> u8 {
        match self {
            CallDirection::MobileOriginated => 0,
            CallDirection::MobileTerminated => 1,
        }
    }

    #[inline]
    pub fn is_mt(&self) -> bool {
        matches!(self, CallDirection::MobileTerminated)
    }
}

/// State of a single call leg, numbered as the `<stat>` field of +CLCC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Holding,
    /// MO call, network has not yet alerted the remote party
    Dialing,
    /// MO call, remote party is being alerted
    Alerting,
    /// MT call ringing while no other call exists
    Incoming,
    /// MT call ringing while another call exists
    Waiting,
}

impl CallState {
    pub fn into_raw(self) -> u8 {
        match self {
            CallState::Active => 0,
            CallState::Holding => 1,
            CallState::Dialing => 2,
            CallState::Alerting => 3,
            CallState::Incoming => 4,
            CallState::Waiting => 5,
        }
    }

    #[inline]
    pub fn is_active_or_held(&self) -> bool {
        matches!(self, CallState::Active | CallState::Holding)
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        matches!(self, CallState::Dialing | CallState::Alerting)
    }

    #[inline]
    pub fn is_ringing(&self) -> bool {
        matches!(self, CallState::Incoming | CallState::Waiting)
    }
}

/// Type-of-Address as reported in +CLCC, 3GPP TS 24.008 10.5.4.7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toa {
    /// Number starts with '+'
    International,
    Unknown,
}

impl Toa {
    pub fn for_number(number: &str) -> Self {
        if number.starts_with('+') {
            Toa::International
        } else {
            Toa::Unknown
        }
    }

    pub fn into_raw(self) -> u8 {
        match self {
            Toa::International => 145,
            Toa::Unknown => 129,
        }
    }
}

/// One call leg held in a slot of the simulated modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub id: CallId,
    pub direction: CallDirection,
    pub state: CallState,
    /// Set while the call is part of a conference
    pub multiparty: bool,
    /// Network portion of the dialed or calling number
    pub number: String,
    pub toa: Toa,
}

impl CallInfo {
    fn new(id: CallId, direction: CallDirection, state: CallState, number: String) -> Self {
        let toa = Toa::for_number(&number);
        Self {
            id,
            direction,
            state,
            multiparty: false,
            number,
            toa,
        }
    }

    pub fn outgoing(id: CallId, number: String) -> Self {
        Self::new(id, CallDirection::MobileOriginated, CallState::Dialing, number)
    }

    pub fn incoming(id: CallId, number: String) -> Self {
        Self::new(id, CallDirection::MobileTerminated, CallState::Incoming, number)
    }

    /// Formats this call as a +CLCC response line. `index` is 1-based.
    /// Mode is always 0 (voice).
    pub fn to_clcc_line(&self, index: usize) -> String {
        format!(
            "+CLCC: {},{},{},0,{},\"{}\",{}",
            index,
            self.direction.into_raw(),
            self.state.into_raw(),
            if self.multiparty { 1 } else { 0 },
            self.number,
            self.toa.into_raw()
        )
    }

    pub fn to_driver_call(&self, index: usize) -> DriverCall {
        DriverCall {
            index,
            is_mt: self.direction.is_mt(),
            state: self.state,
            is_mpty: self.multiparty,
            number: self.number.clone(),
            toa: self.toa,
            is_voice: true,
            als: 0,
        }
    }
}

/// Snapshot of a call as reported to the driver layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCall {
    /// 1-based slot index, as used in CHLD
    pub index: usize,
    pub is_mt: bool,
    pub state: CallState,
    pub is_mpty: bool,
    pub number: String,
    pub toa: Toa,
    pub is_voice: bool,
    /// Alternate line service, always 0
    pub als: u8,
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={},{:?},toa={},{},{},{},als={},{}",
            self.index,
            self.state,
            self.toa.into_raw(),
            if self.is_mpty { "conf" } else { "norm" },
            if self.is_mt { "mt" } else { "mo" },
            self.number,
            self.als,
            if self.is_voice { "voc" } else { "nonvoc" },
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(CallState::Active.is_active_or_held());
        assert!(CallState::Holding.is_active_or_held());
        assert!(!CallState::Dialing.is_active_or_held());
        assert!(CallState::Alerting.is_connecting());
        assert!(!CallState::Incoming.is_connecting());
        assert!(CallState::Waiting.is_ringing());
        assert!(!CallState::Active.is_ringing());
    }

    #[test]
    fn test_clcc_line() {
        let mut call = CallInfo::incoming(1, "+16505551212".to_string());
        call.state = CallState::Waiting;
        call.multiparty = true;
        assert_eq!(call.to_clcc_line(3), "+CLCC: 3,1,5,0,1,\"+16505551212\",145");

        let call = CallInfo::outgoing(2, "5551212".to_string());
        assert_eq!(call.to_clcc_line(1), "+CLCC: 1,0,2,0,0,\"5551212\",129");
    }

    #[test]
    fn test_driver_call() {
        let call = CallInfo::outgoing(9, "+31201234567".to_string());
        let dc = call.to_driver_call(2);
        assert_eq!(dc.index, 2);
        assert!(!dc.is_mt);
        assert_eq!(dc.state, CallState::Dialing);
        assert_eq!(dc.toa, Toa::International);
        assert!(dc.is_voice);
        assert_eq!(dc.to_string(), "id=2,Dialing,toa=145,norm,mo,+31201234567,als=0,voc");
    }
}
