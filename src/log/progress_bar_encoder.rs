//! While the timestep progress bar is drawn, a log line written to the console would leave
//! the tail of the bar behind. The wrapper below erases the current line before delegating.

use log::Record;
use log4rs::encode::{Encode, Write};

/// Wraps another encoder and prefixes each record with an ANSI "clear line" sequence.
#[derive(Debug)]
pub struct PBWrapperEncoder {
    inner: Box<dyn Encode>,
}

impl PBWrapperEncoder {
    pub fn new(inner: Box<dyn Encode>) -> Self {
        Self { inner }
    }
}

impl Encode for PBWrapperEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> Result<(), anyhow::Error> {
        w.write_all(b"\x1B[2K\r")?;
        self.inner.encode(w, record)
    }
}
