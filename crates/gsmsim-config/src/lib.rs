//! gsmsim configuration management
//!
//! This crate provides configuration loading for the simulated modem:
//! - TOML configuration file parsing
//! - Simulator configuration structures and shared runtime state

pub mod sim_config;
pub mod toml_config;

pub use sim_config::*;
pub use toml_config::*;
