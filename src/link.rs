//! Byte-oriented full-duplex channel abstraction shared by both engines.
//!
//! Modeled after the host crate's `connection::serial` module: a thin wrapper
//! around the OS serial port that owns framing-agnostic read/write, with the
//! protocol-specific framing and state machines living one layer up.

use std::io::{Read, Write};
use std::time::Duration;

use log::trace;
use thiserror::Error;

/// Byte-oriented full-duplex channel. All operations are synchronous and
/// single-threaded; a `Link` is owned exclusively by one engine instance.
pub trait Link {
    /// Blocks until at least one byte is available, then returns everything
    /// currently buffered. Never returns an empty vector.
    fn read_available(&mut self) -> Result<Vec<u8>, LinkError>;

    /// Writes the given bytes to the link.
    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Returns the number of bytes currently buffered for reading.
    fn bytes_waiting(&mut self) -> Result<usize, LinkError>;
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serialport(#[from] serialport::Error),
}

/// How long a [`SerialLink`] sleeps between polls of `bytes_to_read` while
/// waiting for the first byte of a burst, and the settle delay used to batch
/// the rest of a burst once it starts arriving.
const POLL_INTERVAL: Duration = Duration::from_millis(15);
const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Production [`Link`] backed by a real serial port.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`, 8 data bits, even parity, one stop bit,
    /// with no read timeout (the protocol layer is responsible for knowing
    /// when a reply is late).
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::Even)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_secs(3600))
            .open()?;
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn read_available(&mut self) -> Result<Vec<u8>, LinkError> {
        loop {
            let waiting = self.port.bytes_to_read().unwrap_or(0);
            if waiting > 0 {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let mut buffer = Vec::new();
        loop {
            let waiting = self.port.bytes_to_read().unwrap_or(0) as usize;
            if waiting == 0 {
                break;
            }
            let start = buffer.len();
            buffer.resize(start + waiting, 0);
            self.port.read_exact(&mut buffer[start..])?;
            std::thread::sleep(SETTLE_DELAY);
        }

        trace!("read_available: {} bytes: {:x?}", buffer.len(), buffer);
        Ok(buffer)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        trace!("write: {} bytes: {:x?}", bytes.len(), bytes);
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn bytes_waiting(&mut self) -> Result<usize, LinkError> {
        Ok(self.port.bytes_to_read()? as usize)
    }
}

/// In-memory [`Link`] used by tests: bytes written by the peer under test are
/// queued in `inbox`, bytes it writes land in `outbox`.
#[cfg(test)]
pub struct FakeLink {
    pub inbox: std::collections::VecDeque<u8>,
    pub outbox: Vec<u8>,
}

#[cfg(test)]
impl FakeLink {
    pub fn new() -> Self {
        Self {
            inbox: std::collections::VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes.iter().copied());
    }
}

#[cfg(test)]
impl Link for FakeLink {
    fn read_available(&mut self) -> Result<Vec<u8>, LinkError> {
        if self.inbox.is_empty() {
            return Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "no data queued on FakeLink",
            )));
        }
        Ok(self.inbox.drain(..).collect())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.outbox.extend_from_slice(bytes);
        Ok(())
    }

    fn bytes_waiting(&mut self) -> Result<usize, LinkError> {
        Ok(self.inbox.len())
    }
}
