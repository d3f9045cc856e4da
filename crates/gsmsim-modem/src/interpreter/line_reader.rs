use std::io::{self, BufReader, Read};

/// Longest line accepted from a session. Excess bytes are dropped.
pub const MAX_LINE_LEN: usize = 0x2000;

const CTRL_Z: u8 = 0x1a;

/// Splits a byte stream into AT command lines.
/// Lines end at CR or LF, empty lines are skipped.
pub struct LineReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Next non-empty line, or None at end of stream
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.read_until_terminator(false)
    }

    /// Like `next_line`, but Ctrl-Z also ends the line. Used for SMS PDUs.
    pub fn next_line_ctrl_z(&mut self) -> io::Result<Option<String>> {
        self.read_until_terminator(true)
    }

    fn read_until_terminator(&mut self, ctrl_z: bool) -> io::Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            let b = byte[0];
            if ctrl_z && b == CTRL_Z {
                break;
            }
            if b == b'\r' || b == b'\n' {
                if line.is_empty() {
                    continue;
                }
                break;
            }
            if line.len() < MAX_LINE_LEN {
                line.push(b);
            } else if line.len() == MAX_LINE_LEN {
                tracing::warn!("line longer than {} bytes, truncating", MAX_LINE_LEN);
                line.push(b);
            }
        }
        line.truncate(MAX_LINE_LEN);
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}
