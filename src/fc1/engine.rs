//! FC1 request/response engine: serves a peer that initiates every
//! transaction, backed by a [`FilesystemAdapter`].

use std::io::Write as _;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::fs::FilesystemAdapter;
use crate::link::{Link, LinkError};

use super::frame::{decode_stream, encode_frame, FrameError, MAX_PAYLOAD_LEN};

const CHUNK_SIZE: usize = 255;
const DEFAULT_RETRY_LIMIT: u32 = 10;

#[derive(Error, Debug)]
pub enum Fc1EngineError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("frame too large to encode: {0}")]
    Frame(#[from] super::frame::FrameError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer sent CANcel")]
    Cancelled,
    #[error("confirmed-write retry limit exhausted for {0:?}")]
    RetriesExhausted(Vec<u8>),
    #[error("requested filename {0:?} is not on the configured whitelist")]
    FilenameNotWhitelisted(String),
}

/// Drives the FC1 protocol over a [`Link`], serving file and status requests
/// from a [`FilesystemAdapter`].
pub struct Fc1Engine<L: Link> {
    link: L,
    buffer: Vec<u8>,
    fs: FilesystemAdapter,
    retry_limit: u32,
}

impl<L: Link> Fc1Engine<L> {
    pub fn new(link: L, fs: FilesystemAdapter) -> Self {
        Self {
            link,
            buffer: Vec::new(),
            fs,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Runs the server loop until a fatal error occurs. Returns normally only
    /// if the caller's `Link` implementation stops producing data in a way
    /// that surfaces as an I/O error (e.g. the process is interrupted and
    /// the link is torn down by the caller).
    pub fn serve(&mut self) -> Result<(), Fc1EngineError> {
        loop {
            match self.step() {
                Ok(()) => continue,
                Err(Fc1EngineError::Cancelled) => {
                    debug!("recovering from CANcel: sending ACK and resuming");
                    self.write_frame(b"ACK")?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads and dispatches exactly one top-level verb.
    fn step(&mut self) -> Result<(), Fc1EngineError> {
        let payload = self.next_frame()?;
        self.dispatch(&payload)
    }

    fn dispatch(&mut self, payload: &[u8]) -> Result<(), Fc1EngineError> {
        if payload == b"ENQ" {
            trace!("ENQ -> ACK");
            self.write_frame(b"ACK")?;
        } else if payload == b"EOT" {
            trace!("EOT: no-op");
        } else if payload == b"CAN" {
            return Err(Fc1EngineError::Cancelled);
        } else if payload == b"ACK" {
            warn!("unexpected ACK outside a confirmed-write context");
        } else if payload == b"LST" {
            self.handle_list()?;
        } else if payload == b"DSZ" {
            self.handle_disk_size()?;
        } else if let Some(filename) = payload.strip_prefix(b"FRD") {
            self.handle_file_read(filename)?;
        } else if let Some(filename) = payload.strip_prefix(b"FWT") {
            self.handle_file_write(filename)?;
        } else {
            warn!("unhandled FC1 verb: {:x?}", payload);
        }
        Ok(())
    }

    fn handle_list(&mut self) -> Result<(), Fc1EngineError> {
        let files = self.fs.list_job_files()?;
        let mut body = format!("LST{:04}", files.len());
        for name in &files {
            body.push_str(&format!("{name:<12}"));
        }
        self.confirmed_write(body.as_bytes())?;
        self.write_frame(b"EOF")?;
        Ok(())
    }

    fn handle_disk_size(&mut self) -> Result<(), Fc1EngineError> {
        self.confirmed_write(b"DSZ00729088")?;
        self.write_frame(b"EOF")?;
        Ok(())
    }

    fn handle_file_read(&mut self, filename: &[u8]) -> Result<(), Fc1EngineError> {
        let filename = String::from_utf8_lossy(filename).trim_end().to_string();

        if let Some(whitelist) = self.fs.whitelist() {
            if !whitelist.iter().any(|w| w == &filename) {
                return Err(Fc1EngineError::FilenameNotWhitelisted(filename));
            }
        }

        let path = self.fs.resolve(&filename);
        let raw = std::fs::read_to_string(&path)?;
        let base = std::path::Path::new(&filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());
        let content = self.fs.normalise(&base, &raw);

        self.confirmed_write(format!("FSZ{:08}", content.len()).as_bytes())?;
        for chunk in content.as_bytes().chunks(CHUNK_SIZE) {
            let mut frame_payload = Vec::with_capacity(3 + chunk.len());
            frame_payload.extend_from_slice(b"FRD");
            frame_payload.extend_from_slice(chunk);
            self.confirmed_write(&frame_payload)?;
        }
        self.write_frame(b"EOF")?;
        Ok(())
    }

    fn handle_file_write(&mut self, filename: &[u8]) -> Result<(), Fc1EngineError> {
        let filename = String::from_utf8_lossy(filename).trim_end().to_string();
        let desired = self.fs.resolve(&filename);
        let target = self.fs.resolve_write_target(&desired);

        self.write_frame(b"ACK")?;

        let mut file = std::fs::File::create(&target)?;
        loop {
            let payload = self.next_frame()?;
            if let Some(chunk) = payload.strip_prefix(b"FWT") {
                file.write_all(chunk)?;
                self.write_frame(b"ACK")?;
            } else if payload == b"EOF" {
                self.write_frame(b"ACK")?;
                break;
            } else {
                warn!("unexpected frame during file write: {:x?}", payload);
            }
        }
        Ok(())
    }

    /// Sends `payload`, then reads one frame: `ACK` confirms, `CAN` cancels
    /// the session, anything else consumes one retry.
    fn confirmed_write(&mut self, payload: &[u8]) -> Result<(), Fc1EngineError> {
        let mut retries_left = self.retry_limit;
        loop {
            self.write_frame(payload)?;
            let reply = self.next_frame()?;
            if reply == b"ACK" {
                return Ok(());
            }
            if reply == b"CAN" {
                return Err(Fc1EngineError::Cancelled);
            }
            retries_left -= 1;
            if retries_left == 0 {
                return Err(Fc1EngineError::RetriesExhausted(payload.to_vec()));
            }
            warn!(
                "confirmed_write got {:x?} instead of ACK, {} retries left",
                reply, retries_left
            );
        }
    }

    fn write_frame(&mut self, payload: &[u8]) -> Result<(), Fc1EngineError> {
        let frame = encode_frame(payload)?;
        self.link.write(&frame)?;
        Ok(())
    }

    /// Pull-style frame reader: drains the rolling buffer through the
    /// framer, refilling from the link on `NeedMore` and resyncing by one
    /// byte on `InvalidHeader`.
    fn next_frame(&mut self) -> Result<Vec<u8>, Fc1EngineError> {
        loop {
            match decode_stream(&self.buffer) {
                Ok(outcome) => {
                    self.buffer.drain(..outcome.consumed);
                    return Ok(outcome.payload);
                }
                Err(FrameError::InvalidHeader) => {
                    if self.buffer.is_empty() {
                        self.refill()?;
                    } else {
                        self.buffer.remove(0);
                    }
                }
                Err(FrameError::NeedMore) => self.refill()?,
                Err(FrameError::PayloadTooLarge(_)) => unreachable!("never produced by decode"),
            }
        }
    }

    fn refill(&mut self) -> Result<(), Fc1EngineError> {
        let bytes = self.link.read_available()?;
        if self.buffer.len() + bytes.len() > MAX_PAYLOAD_LEN * 4 {
            warn!("FC1 rolling buffer growing large; peer may be noisy");
        }
        self.buffer.extend(bytes);
        Ok(())
    }
}
