use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gsmsim_config::{CfgCallState, SharedConfig, SimConfig, SimState};
use gsmsim_modem::{CallStateHandle, ModelInterpreter, SimulatedCommands, SimulatedGsmCallState, SimulatedRadioControl};

use super::sink::Sink;

/// Default config for testing. Auto-progress is off so tests step calls
/// explicitly; tests exercising the timer switch it back on.
pub fn default_test_config() -> SimConfig {
    SimConfig {
        call_state: CfgCallState {
            auto_progress: false,
            connecting_pause_ms: 20,
        },
        ..SimConfig::default()
    }
}

/// Polls `cond` until it holds, failing the test after `timeout`
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        thread::sleep(Duration::from_millis(5));
    }
}

/// One call state worker with both front ends attached
pub struct ModemTest {
    pub config: SharedConfig,
    pub call_state: CallStateHandle,
    pub interpreter: Arc<ModelInterpreter>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ModemTest {
    pub fn new(config: SimConfig) -> Self {
        let shared_config = SharedConfig::from_parts(config, SimState::default()).unwrap();
        let sim = SimulatedGsmCallState::from_config(&shared_config.config().call_state);
        let (call_state, worker) = CallStateHandle::spawn(sim).unwrap();
        let interpreter = ModelInterpreter::from_config(call_state.clone(), &shared_config.config());

        Self {
            config: shared_config,
            call_state,
            interpreter: Arc::new(interpreter),
            worker: Some(worker),
        }
    }

    pub fn commands(&self) -> SimulatedCommands {
        SimulatedCommands::new(self.call_state.clone())
    }

    /// Feeds `script` through a complete interpreter session and returns
    /// the output lines
    pub fn run_session(&self, script: &str) -> Vec<String> {
        let sink = Sink::new();
        self.interpreter
            .serve(Cursor::new(script.as_bytes().to_vec()), sink.clone())
            .unwrap();
        sink.take_lines()
    }
}

impl Drop for ModemTest {
    fn drop(&mut self) {
        self.interpreter.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
