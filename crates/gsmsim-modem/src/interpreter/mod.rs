//! AT command interpreter in front of the simulated call state.
//!
//! A session is a byte stream pair. Each command line gets its response lines
//! followed by a final result (`OK`, `ERROR` or `NO CARRIER`), all terminated
//! by a bare CR. Unsolicited `RING` / `NO CARRIER` produced through the
//! [`SimulatedRadioControl`] surface go to whichever session is connected.

pub mod line_reader;
pub mod server;

use core::fmt;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gsmsim_config::SimConfig;
use gsmsim_core::{assert_warn, unimplemented_log};

use crate::radio_control::{ResponseGate, SimulatedRadioControl};
use crate::worker::{CallStateClosed, CallStateHandle};

pub use line_reader::LineReader;

pub const FINAL_OK: &str = "OK";
pub const FINAL_ERROR: &str = "ERROR";
pub const FINAL_NO_CARRIER: &str = "NO CARRIER";

/// Greeting printed when a session starts
pub const WELCOME: &str = "Welcome";

/// Built-in replies for commands that do not touch call state.
/// `None` acknowledges the command with the final OK only.
const DEFAULT_RESPONSES: &[(&str, Option<&str>)] = &[
    ("E0Q0V1", None),
    ("+CMEE=2", None),
    ("+CREG=2", None),
    ("+CGREG=2", None),
    ("+CCWA=1", None),
    ("+COPS=0", None),
    ("+CFUN=1", None),
    ("+CGMI", Some("+CGMI: gsmsim Model AT Interpreter")),
    ("+CGMM", Some("+CGMM: gsmsim Model AT Interpreter")),
    ("+CGMR", Some("+CGMR: 1.0")),
    ("+CGSN", Some("000000000000000")),
    ("+CIMI", Some("320720000000000")),
    ("+CSCS=?", Some("%CSCS: (\"HEX\",\"UCS2\")")),
    ("+CFUN?", Some("+CFUN: 1")),
    (
        "+COPS=3,0;+COPS?;+COPS=3,1;+COPS?;+COPS=3,2;+COPS?",
        Some("+COPS: 0,0,\"gsmsim\"\n+COPS: 0,1,\"gsmsim\"\n+COPS: 0,2,\"310995\""),
    ),
    ("+CREG?", Some("+CREG: 2,5, \"0113\", \"6614\"")),
    ("+CGREG?", Some("+CGREG: 2,0")),
    ("+CSQ", Some("+CSQ: 16,99")),
    ("+CNMI?", Some("+CNMI: 1,2,2,1,1")),
    ("+CLIR?", Some("+CLIR: 1,3")),
    ("%CPVWI=2", Some("%CPVWI: 0")),
    ("+CUSD=1,\"#646#\"", Some("+CUSD=0,\"You have used 23 minutes\"")),
    ("+CRSM=176,12258,0,0,10", Some("+CRSM: 144,0,981062200050259429F6")),
    ("+CRSM=192,12258,0,0,15", Some("+CRSM: 144,0,0000000A2FE204000FF55501020000")),
    ("+CSMS=1", Some("+CSMS: 0,1,1")),
    ("+CNMA=1", None),
    ("+CMGF=0", None),
];

/// A command line that did not complete with OK
#[derive(Debug)]
pub enum InterpreterEx {
    /// Final result other than OK, such as ERROR or NO CARRIER
    Final(&'static str),
    /// Session stream failed
    Io(io::Error),
}

impl InterpreterEx {
    fn error() -> Self {
        InterpreterEx::Final(FINAL_ERROR)
    }
}

impl fmt::Display for InterpreterEx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterEx::Final(result) => write!(f, "command finished with {}", result),
            InterpreterEx::Io(e) => write!(f, "session I/O error: {}", e),
        }
    }
}

impl std::error::Error for InterpreterEx {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterpreterEx::Io(e) => Some(e),
            InterpreterEx::Final(_) => None,
        }
    }
}

impl From<io::Error> for InterpreterEx {
    fn from(e: io::Error) -> Self {
        InterpreterEx::Io(e)
    }
}

impl From<CallStateClosed> for InterpreterEx {
    fn from(_: CallStateClosed) -> Self {
        InterpreterEx::error()
    }
}

type SessionWriter = Box<dyn Write + Send>;
type ShutdownHook = Box<dyn Fn() + Send + Sync>;

/// Writes one response line with the CR terminator
fn println(out: &mut dyn Write, line: &str) -> io::Result<()> {
    tracing::debug!("-> {}", line);
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r")?;
    out.flush()
}

pub struct ModelInterpreter {
    call_state: CallStateHandle,
    /// Keyed by upper-cased command without the AT prefix
    responses: HashMap<String, Vec<String>>,
    output: Mutex<Option<SessionWriter>>,
    gate: ResponseGate,
    shut_down: AtomicBool,
    /// Run on shutdown to close whatever transport feeds the session
    shutdown_hooks: Mutex<Vec<ShutdownHook>>,
}

impl ModelInterpreter {
    pub fn new(call_state: CallStateHandle) -> Self {
        let responses = DEFAULT_RESPONSES
            .iter()
            .map(|(command, response)| (command.to_string(), split_response(response.unwrap_or(""))))
            .collect();
        Self {
            call_state,
            responses,
            output: Mutex::new(None),
            gate: ResponseGate::default(),
            shut_down: AtomicBool::new(false),
            shutdown_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Built-in responses extended and overridden by the configured ones
    pub fn from_config(call_state: CallStateHandle, cfg: &SimConfig) -> Self {
        let mut interpreter = Self::new(call_state);
        for (command, response) in &cfg.responses {
            interpreter.set_response(command, response);
        }
        interpreter
    }

    /// Adds or replaces a static response. Lines are separated by '\n'.
    pub fn set_response(&mut self, command: &str, response: &str) {
        let command = command.to_ascii_uppercase();
        tracing::debug!("static response for {}: {:?}", command, response);
        self.responses.insert(command, split_response(response));
    }

    pub fn call_state(&self) -> &CallStateHandle {
        &self.call_state
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn has_session(&self) -> bool {
        self.lock_output().is_some()
    }

    /// Registers `hook` to run once on shutdown. Transports use it to close
    /// the stream a session is blocked reading from.
    pub fn add_shutdown_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shutdown_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    fn lock_output(&self) -> MutexGuard<'_, Option<SessionWriter>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serves one session until the input ends or the interpreter shuts
    /// down. The output also receives unsolicited results while the session
    /// lasts.
    pub fn serve<R, W>(&self, input: R, output: W) -> io::Result<()>
    where
        R: Read,
        W: Write + Send + 'static,
    {
        {
            let mut current = self.lock_output();
            // Checked under the lock so a concurrent shutdown cannot miss this writer
            if self.is_shut_down() {
                tracing::debug!("interpreter shut down, session refused");
                return Ok(());
            }
            assert_warn!(current.is_none(), "replacing the output of a session still in progress");
            *current = Some(Box::new(output));
        }
        let result = self.run_session(LineReader::new(input));
        *self.lock_output() = None;
        result
    }

    fn run_session<R: Read>(&self, mut reader: LineReader<R>) -> io::Result<()> {
        self.unsolicited(WELCOME)?;

        while let Some(line) = reader.next_line()? {
            tracing::debug!("<- {}", line);
            self.gate.wait_open();
            if self.is_shut_down() {
                break;
            }

            let mut current = self.lock_output();
            let Some(out) = current.as_mut() else {
                break;
            };
            let out: &mut dyn Write = &mut **out;
            match self.process_line(&line, &mut reader, out) {
                Ok(lines) => {
                    for l in &lines {
                        println(out, l)?;
                    }
                }
                Err(InterpreterEx::Final(result)) => println(out, result)?,
                Err(InterpreterEx::Io(e)) => return Err(e),
            }
        }
        tracing::debug!("session input closed");
        Ok(())
    }

    /// Runs one command line. Returns the response lines including the
    /// final result. `+CMGS` prompts on `out` and reads its PDU from `reader`.
    pub fn process_line<R: Read>(
        &self,
        line: &str,
        reader: &mut LineReader<R>,
        out: &mut dyn Write,
    ) -> Result<Vec<String>, InterpreterEx> {
        let Some(command) = strip_at_prefix(line) else {
            return Err(InterpreterEx::error());
        };
        if command.is_empty() {
            return Ok(vec![FINAL_OK.to_string()]);
        }

        let mut lines = if command == "A" {
            self.on_answer()?
        } else if command == "H" {
            self.on_hangup()?
        } else if let Some(args) = command.strip_prefix("+CHLD=") {
            self.on_chld(args)?
        } else if command == "+CLCC" {
            self.call_state.clcc_lines()?
        } else if let Some(address) = command.strip_prefix('D') {
            self.on_dial(address)?
        } else if command.starts_with("+CMGS=") {
            self.on_sms_send(reader, out)?
        } else {
            match self.responses.get(&command.to_ascii_uppercase()) {
                Some(response) => response.clone(),
                None => {
                    tracing::debug!("no response for {}", command);
                    return Err(InterpreterEx::error());
                }
            }
        };
        lines.push(FINAL_OK.to_string());
        Ok(lines)
    }

    fn on_answer(&self) -> Result<Vec<String>, InterpreterEx> {
        if !self.call_state.on_answer()? {
            return Err(InterpreterEx::error());
        }
        Ok(Vec::new())
    }

    /// ATH ends with NO CARRIER instead of OK
    fn on_hangup(&self) -> Result<Vec<String>, InterpreterEx> {
        if !self.call_state.on_hangup()? {
            return Err(InterpreterEx::error());
        }
        Err(InterpreterEx::Final(FINAL_NO_CARRIER))
    }

    fn on_chld(&self, args: &str) -> Result<Vec<String>, InterpreterEx> {
        let mut chars = args.chars();
        let Some(action) = chars.next() else {
            return Err(InterpreterEx::error());
        };
        let index = chars.next();
        if !self.call_state.on_chld(action, index)? {
            return Err(InterpreterEx::error());
        }
        Ok(Vec::new())
    }

    fn on_dial(&self, address: &str) -> Result<Vec<String>, InterpreterEx> {
        if !self.call_state.on_dial(address)? {
            return Err(InterpreterEx::error());
        }
        Ok(Vec::new())
    }

    fn on_sms_send<R: Read>(
        &self,
        reader: &mut LineReader<R>,
        out: &mut dyn Write,
    ) -> Result<Vec<String>, InterpreterEx> {
        out.write_all(b"> ")?;
        out.flush()?;
        let Some(pdu) = reader.next_line_ctrl_z()? else {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "session closed inside SMS PDU").into());
        };
        tracing::debug!("SMS PDU ({} chars) accepted", pdu.len());
        Ok(vec!["+CMGS: 1".to_string()])
    }

    /// Writes to the connected session, if any
    fn unsolicited(&self, line: &str) -> io::Result<()> {
        match self.lock_output().as_mut() {
            Some(out) => println(out.as_mut(), line),
            None => {
                tracing::debug!("no session for unsolicited {}", line);
                Ok(())
            }
        }
    }

    fn unsolicited_logged(&self, line: &str) {
        if let Err(e) = self.unsolicited(line) {
            tracing::warn!("failed to send unsolicited {}: {}", line, e);
        }
    }

    fn notify_hangup(&self, result: Result<bool, CallStateClosed>) -> bool {
        let hung_up = result.unwrap_or(false);
        if hung_up {
            self.unsolicited_logged(FINAL_NO_CARRIER);
        }
        hung_up
    }
}

impl SimulatedRadioControl for ModelInterpreter {
    fn trigger_ring(&self, number: &str) -> bool {
        // Held across the FSM call so RING cannot land inside a response
        let mut current = self.lock_output();
        let rang = self.call_state.trigger_ring(number).unwrap_or(false);
        if rang {
            if let Some(out) = current.as_mut() {
                if let Err(e) = println(out.as_mut(), "RING") {
                    tracing::warn!("failed to send RING: {}", e);
                }
            }
        }
        rang
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
        unimplemented_log!("call fail cause {} over AT", cause);
    }

    fn trigger_hangup_foreground(&self) -> bool {
        self.notify_hangup(self.call_state.trigger_hangup_foreground())
    }

    fn trigger_hangup_background(&self) -> bool {
        self.notify_hangup(self.call_state.trigger_hangup_background())
    }

    fn trigger_hangup_all(&self) -> bool {
        self.notify_hangup(self.call_state.trigger_hangup_all())
    }

    fn trigger_incoming_sms(&self, message: &str) {
        unimplemented_log!("incoming SMS over AT ({} chars)", message.len());
    }

    fn pause_responses(&self) {
        self.gate.pause();
    }

    fn resume_responses(&self) {
        self.gate.resume();
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::info!("interpreter shutting down");
            self.call_state.shutdown();

            // Hooks first: a session reading an SMS body blocks while holding the output lock
            for hook in self.shutdown_hooks.lock().unwrap_or_else(PoisonError::into_inner).iter() {
                hook();
            }
            *self.lock_output() = None;
        }
    }
}

/// Command text after the AT prefix, which may be in either case
fn strip_at_prefix(line: &str) -> Option<&str> {
    let prefix = line.get(..2)?;
    if prefix.eq_ignore_ascii_case("AT") {
        line.get(2..)
    } else {
        None
    }
}

fn split_response(response: &str) -> Vec<String> {
    response
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
