//! Simulated GSM modem: the call-state machine and the front ends that drive it.

pub mod call_state;
pub mod commands;
pub mod interpreter;
pub mod radio_control;
pub mod worker;

pub use call_state::{InvalidStateErr, MAX_CALLS, SimulatedGsmCallState};
pub use commands::{CommandException, SimulatedCommands};
pub use interpreter::{InterpreterEx, ModelInterpreter, server::TcpModemServer};
pub use radio_control::SimulatedRadioControl;
pub use worker::{CallStateClosed, CallStateHandle};
