use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Session output collector for testing purposes.
/// Clones share the same buffer, so one clone can go to the interpreter
/// while the test inspects another.
#[derive(Clone, Default)]
pub struct Sink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, split on the CR terminator
    pub fn take_lines(&self) -> Vec<String> {
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap());
        String::from_utf8_lossy(&bytes)
            .split('\r')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Write for Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
