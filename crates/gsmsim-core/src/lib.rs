//! Core types for the gsmsim simulated modem
//!
//! This crate provides the value types shared by the modem front ends:
//! - CallInfo and the per-call state, direction and type-of-address
//! - DriverCall snapshots and +CLCC formatting
//! - Dial string normalisation
//! - Logging setup and debug macros

pub mod call;
pub mod debug;
pub mod phone_number;

pub use call::{CallDirection, CallId, CallInfo, CallState, DriverCall, Toa};
pub use phone_number::extract_network_portion;
