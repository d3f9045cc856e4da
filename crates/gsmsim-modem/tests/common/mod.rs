#![allow(dead_code)]

mod modem_test;
mod sink;

pub use modem_test::{ModemTest, default_test_config, wait_until};
pub use sink::Sink;
