//! The transaction layer: server-side dispatch of incoming BSC transactions
//! by code, plus the client-role operations (`put_file`, `get_file`,
//! `execute_command`) that drive a peer.

use log::{info, warn};
use thiserror::Error;

use crate::fs::FilesystemAdapter;
use crate::link::Link;

use super::codes::{self, TransactionCode};
use super::control::ControlChar;
use super::engine::{BscEngine, BscEngineError, ReadOutcome};

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error(transparent)]
    Engine(#[from] BscEngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no transaction code is known for filename {0:?}")]
    UnknownFilename(String),
    #[error("unhandled header code {0:?}")]
    UnhandledHeader(String),
    #[error("unexpected control character {0:?}")]
    UnexpectedControl(ControlChar),
}

/// Outcome of `execute_command`.
#[derive(Debug, PartialEq, Eq)]
pub enum ExecResult {
    Success,
    Error(String),
    Data(Vec<String>),
}

pub struct BscTransactionLayer<L: Link> {
    engine: BscEngine<L>,
    fs: FilesystemAdapter,
}

fn header_text(header: &[u8; 6]) -> String {
    String::from_utf8_lossy(header).into_owned()
}

impl<L: Link> BscTransactionLayer<L> {
    pub fn new(engine: BscEngine<L>, fs: FilesystemAdapter) -> Self {
        Self { engine, fs }
    }

    /// Reads and dispatches one transaction, server role. Returns `Ok(())`
    /// once the transaction (and its reply) are complete.
    pub fn serve_one(&mut self) -> Result<(), TransactionError> {
        match self.engine.read_message()? {
            ReadOutcome::Control(ControlChar::Enq) => {
                self.engine.send_ack()?;
                Ok(())
            }
            ReadOutcome::Control(ControlChar::Eot) => {
                warn!("out-of-sequence EOT in main loop");
                self.engine.receive_eot(false)?;
                Ok(())
            }
            ReadOutcome::Control(other) => {
                warn!("unexpected control character in main loop: {other:?}");
                Err(TransactionError::UnexpectedControl(other))
            }
            ReadOutcome::Message { header, body } => {
                let Some(header) = header else {
                    warn!("message had no header code, dropping");
                    return Ok(());
                };
                self.dispatch(header, &body)
            }
        }
    }

    fn dispatch(&mut self, header: [u8; 6], body: &[u8]) -> Result<(), TransactionError> {
        match codes::classify(&header) {
            TransactionCode::IncomingFile(id) => self.handle_incoming_file(id, body, true),
            TransactionCode::FileRequest(id) => self.handle_file_request(id, body),
            _ => {
                let text = header_text(&header);
                warn!("unhandled header code {text}");
                Err(TransactionError::UnhandledHeader(text))
            }
        }
    }

    /// `02,0xx`: split the body at the first `\r` into base filename and
    /// content, normalise, and write to disk. `confirm` sends the
    /// `90,000`/`0000` execution-confirmation reply only when the peer is
    /// actually expecting one (the unsolicited server dispatch path), not
    /// when this is reached via `get_file`'s reply handling.
    fn handle_incoming_file(&mut self, id: u32, body: &[u8], confirm: bool) -> Result<(), TransactionError> {
        let (base, content) = split_name_block(body);
        let code = format!("02,{id:03}");
        let ext = crate::fs::extension_for_code(&code);
        let filename = format!("{base}.{ext}");

        let desired = self.fs.resolve(&filename);
        let target = self.fs.resolve_write_target(&desired);
        let content = String::from_utf8_lossy(content);
        let normalised = self.fs.normalise(&base, &content);
        std::fs::write(&target, normalised)?;
        info!("wrote incoming file {}", target.display());

        if confirm {
            self.engine.send_short_message(b"90,000", b"0000")?;
        }
        Ok(())
    }

    /// `02,0yy`: look the requested base name up on disk and either reply
    /// `4040` or relay it via `put_file`.
    fn handle_file_request(&mut self, id: u32, body: &[u8]) -> Result<(), TransactionError> {
        let (base, _rest) = split_name_block(body);
        let code = format!("02,{id:03}");
        let ext = crate::fs::extension_for_code(&code);
        let filename = format!("{base}.{ext}");

        if !self.fs.resolve(&filename).exists() {
            return self
                .engine
                .send_short_message(b"90,000", b"4040")
                .map_err(Into::into);
        }

        let response_code = super::codes::incoming_file_code(id);
        self.put_file(&filename, Some(response_code), true)
    }

    /// Client role: sends `filename`'s content as a name-prefixed BSC
    /// message, optionally confirming a `90,000`/`0000` response.
    pub fn put_file(
        &mut self,
        filename: &str,
        header: Option<[u8; 6]>,
        confirm: bool,
    ) -> Result<(), TransactionError> {
        let header = match header {
            Some(h) => h,
            None => {
                let id = codes::code_for_filename(filename)
                    .ok_or_else(|| TransactionError::UnknownFilename(filename.to_string()))?;
                codes::incoming_file_code(id)
            }
        };

        let path = self.fs.resolve(filename);
        let content = std::fs::read_to_string(&path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalised = self.fs.normalise(&stem, &content);
        // wire content is `\r`-delimited; local storage keeps `\r\n`.
        let wire_content = normalised.replace('\n', "");

        let mut body = format!("{stem}\r").into_bytes();
        body.extend_from_slice(wire_content.as_bytes());

        self.engine.send_handshake()?;
        let blocks = super::block::encode(&header, &body, super::block::Encoding::NamePrefixed);
        for blk in &blocks {
            self.engine.confirmed_write(blk)?;
        }
        self.engine.send_eot()?;

        if confirm {
            match self.engine.read_message()? {
                ReadOutcome::Message {
                    header: Some(h),
                    body,
                } if h == *b"90,000" => {
                    let text = String::from_utf8_lossy(&body);
                    if text.trim() != "0000" {
                        warn!("put_file execution response: {}", text.trim());
                    }
                }
                other => warn!("unexpected put_file confirmation: {other:?}"),
            }
        }

        Ok(())
    }

    /// Client role: requests `filename` from the peer and writes the reply
    /// to disk via the same path as an unsolicited incoming file.
    pub fn get_file(&mut self, filename: &str, header: Option<[u8; 6]>) -> Result<(), TransactionError> {
        let id = match header {
            Some(h) => {
                let text = header_text(&h);
                text.split(',').nth(1).and_then(|s| s.parse().ok()).unwrap_or(0)
            }
            None => codes::code_for_filename(filename)
                .ok_or_else(|| TransactionError::UnknownFilename(filename.to_string()))?,
        };
        let request_code = codes::file_request_code(id);

        let stem = filename.split('.').next().unwrap_or(filename);
        self.engine
            .send_short_message(&request_code, format!("{stem}\r").as_bytes())?;

        self.engine.receive_handshake()?;
        match self.engine.read_message()? {
            ReadOutcome::Message { body, .. } => self.handle_incoming_file(id, &body, false),
            other => {
                warn!("unexpected get_file reply: {other:?}");
                Ok(())
            }
        }
    }

    /// Client role: issues `01,000` with `text`, returning the robot's
    /// response as a structured [`ExecResult`].
    pub fn execute_command(&mut self, text: &str) -> Result<ExecResult, TransactionError> {
        let mut body = text.as_bytes().to_vec();
        body.push(b'\r');
        self.engine.send_short_message(b"01,000", &body)?;

        self.engine.receive_handshake()?;
        match self.engine.read_message()? {
            ReadOutcome::Message {
                header: Some(h),
                body,
            } if h == *b"90,001" => {
                let text = String::from_utf8_lossy(&body);
                let fields: Vec<String> = text
                    .split(|c| c == ',' || c == '\r')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(ExecResult::Data(fields))
            }
            ReadOutcome::Message {
                header: Some(h),
                body,
            } if h == *b"90,000" => {
                let code = String::from_utf8_lossy(&body).trim().to_string();
                if code == "0000" {
                    Ok(ExecResult::Success)
                } else {
                    let message = codes::error_text(&code).unwrap_or("unknown error code").to_string();
                    Ok(ExecResult::Error(format!("{code}: {message}")))
                }
            }
            other => {
                warn!("unexpected execute_command reply: {other:?}");
                Ok(ExecResult::Error("malformed reply".to_string()))
            }
        }
    }
}

/// Splits a BSC message body at the first `\r` into (base filename, rest).
fn split_name_block(body: &[u8]) -> (String, &[u8]) {
    match body.iter().position(|&b| b == b'\r') {
        Some(idx) => (
            String::from_utf8_lossy(&body[..idx]).into_owned(),
            &body[idx + 1..],
        ),
        None => (String::from_utf8_lossy(body).into_owned(), &[]),
    }
}
