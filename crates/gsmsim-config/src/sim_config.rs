use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Delay between the connecting steps of an outgoing call (Dialing -> Alerting -> Active)
pub const DEFAULT_CONNECTING_PAUSE_MS: u64 = 500;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6543;

/// Listening socket of the AT interpreter
#[derive(Debug, Clone)]
pub struct CfgServer {
    pub host: String,
    pub port: u16,
}

impl Default for CfgServer {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl CfgServer {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CfgCallState {
    /// Outgoing calls progress to Alerting and Active on their own
    pub auto_progress: bool,
    /// Pause before each automatic progress step
    pub connecting_pause_ms: u64,
}

impl Default for CfgCallState {
    fn default() -> Self {
        Self {
            auto_progress: true,
            connecting_pause_ms: DEFAULT_CONNECTING_PAUSE_MS,
        }
    }
}

impl CfgCallState {
    pub fn connecting_pause(&self) -> Duration {
        Duration::from_millis(self.connecting_pause_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    /// Optional verbose log file
    pub debug_log: Option<String>,

    pub server: CfgServer,

    pub call_state: CfgCallState,

    /// Extra static AT responses, keyed by command without the "AT" prefix.
    /// Lines within a response are separated by '\n'. An empty response
    /// acknowledges the command with a bare OK.
    pub responses: BTreeMap<String, String>,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.server.port == 0 {
            return Err("server port must be non-zero");
        }
        if self.server.host.is_empty() {
            return Err("server host must be set");
        }
        if self.call_state.auto_progress && self.call_state.connecting_pause_ms == 0 {
            return Err("connecting_pause_ms must be non-zero when auto_progress is enabled");
        }
        for command in self.responses.keys() {
            if command.is_empty() {
                return Err("static response commands must be non-empty");
            }
            if command.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("AT")) {
                return Err("static response commands are given without the AT prefix");
            }
        }
        Ok(())
    }
}

/// Mutable runtime state (lock-protected), written by the interpreter server.
#[derive(Debug, Clone, Default)]
pub struct SimState {
    /// Peer of the session currently being served, if any
    pub active_session: Option<String>,
    pub sessions_served: u64,
}

/// Global shared configuration: immutable config + mutable state.
#[derive(Clone)]
pub struct SharedConfig {
    cfg: Arc<SimConfig>,
    state: Arc<RwLock<SimState>>,
}

impl SharedConfig {
    pub fn from_config(cfg: SimConfig) -> Result<Self, String> {
        Self::from_parts(cfg, SimState::default())
    }

    pub fn from_parts(cfg: SimConfig, state: SimState) -> Result<Self, String> {
        cfg.validate().map_err(|e| format!("Invalid simulator configuration: {}", e))?;

        Ok(Self {
            cfg: Arc::new(cfg),
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<SimConfig> {
        Arc::clone(&self.cfg)
    }

    /// Read guard for mutable state.
    pub fn state_read(&self) -> std::sync::RwLockReadGuard<'_, SimState> {
        self.state.read().expect("SimState RwLock poisoned")
    }

    /// Write guard for mutable state.
    pub fn state_write(&self) -> std::sync::RwLockWriteGuard<'_, SimState> {
        self.state.write().expect("SimState RwLock poisoned")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:6543");
        assert_eq!(cfg.call_state.connecting_pause(), Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_zero_pause_with_auto_progress() {
        let mut cfg = SimConfig::default();
        cfg.call_state.connecting_pause_ms = 0;
        assert!(cfg.validate().is_err());

        cfg.call_state.auto_progress = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_prefixed_response() {
        let mut cfg = SimConfig::default();
        cfg.responses.insert("AT+CGMR".to_string(), "+CGMR: 2.0".to_string());
        assert!(SharedConfig::from_config(cfg).is_err());
    }

    #[test]
    fn test_rejects_lowercase_prefixed_response() {
        let mut cfg = SimConfig::default();
        cfg.responses.insert("at+cgmr".to_string(), "+CGMR: 2.0".to_string());
        assert!(SharedConfig::from_config(cfg).is_err());

        let mut cfg = SimConfig::default();
        cfg.responses.insert("+cgmr".to_string(), "+CGMR: 2.0".to_string());
        assert!(SharedConfig::from_config(cfg).is_ok());
    }

    #[test]
    fn test_state_roundtrip() {
        let shared = SharedConfig::from_config(SimConfig::default()).unwrap();
        shared.state_write().sessions_served += 1;
        let other = shared.clone();
        assert_eq!(other.state_read().sessions_served, 1);
    }
}
