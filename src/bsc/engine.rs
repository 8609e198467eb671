//! The BSC link-layer engine: ack-bit discipline, handshake, confirmed
//! writes, and multi-block message assembly on top of a [`Link`].

use log::{debug, trace, warn};
use thiserror::Error;

use crate::link::{Link, LinkError};

use super::ack::AckBit;
use super::block::{self, BlockError, Encoding};
use super::control::{self, ControlChar, EOT, ENQ};

const DEFAULT_RETRY_LIMIT: u32 = 10;

#[derive(Error, Debug)]
pub enum BscEngineError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("expected {expected:?}, got {got:?}")]
    InvalidTransaction {
        expected: &'static str,
        got: Vec<u8>,
    },
    #[error("confirmed write exhausted its retry budget")]
    RetriesExhausted,
}

/// The result of reading one complete message off the wire.
#[derive(Debug)]
pub enum ReadOutcome {
    Control(ControlChar),
    Message {
        header: Option<[u8; 6]>,
        body: Vec<u8>,
    },
}

pub struct BscEngine<L: Link> {
    link: L,
    ack: AckBit,
    retry_limit: u32,
}

impl<L: Link> BscEngine<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            ack: AckBit::new(),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(link: L, retry_limit: u32) -> Self {
        Self {
            link,
            ack: AckBit::new(),
            retry_limit,
        }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Returns the ack due now and flips the bit for next time.
    pub fn current_ack(&mut self) -> [u8; 2] {
        self.ack.current()
    }

    pub fn send_ack(&mut self) -> Result<(), BscEngineError> {
        let ack = self.current_ack();
        self.link.write(&ack)?;
        Ok(())
    }

    pub fn send_eot(&mut self) -> Result<(), BscEngineError> {
        self.link.write(&[EOT])?;
        self.ack.reset();
        Ok(())
    }

    /// Optionally reads and asserts an EOT is on the wire, then resets the
    /// ack bit regardless.
    pub fn receive_eot(&mut self, read_from_wire: bool) -> Result<(), BscEngineError> {
        if read_from_wire {
            let bytes = self.link.read_available()?;
            if control::recognize(&bytes) != Some(ControlChar::Eot) {
                return Err(BscEngineError::InvalidTransaction {
                    expected: "EOT",
                    got: bytes,
                });
            }
        }
        self.ack.reset();
        Ok(())
    }

    pub fn send_handshake(&mut self) -> Result<(), BscEngineError> {
        self.link.write(&[ENQ])?;
        let expected = self.ack.peek();
        let bytes = self.link.read_available()?;
        if bytes != expected {
            return Err(BscEngineError::InvalidTransaction {
                expected: "ACK",
                got: bytes,
            });
        }
        self.ack.advance();
        Ok(())
    }

    pub fn receive_handshake(&mut self) -> Result<(), BscEngineError> {
        let bytes = self.link.read_available()?;
        if control::recognize(&bytes) != Some(ControlChar::Enq) {
            return Err(BscEngineError::InvalidTransaction {
                expected: "ENQ",
                got: bytes,
            });
        }
        self.send_ack()
    }

    /// Writes `block` and waits for the currently expected ack, retrying
    /// on mismatch up to the configured bound.
    pub fn confirmed_write(&mut self, blk: &[u8]) -> Result<(), BscEngineError> {
        let expected = self.ack.peek();
        for attempt in 0..self.retry_limit {
            self.link.write(blk)?;
            let bytes = self.link.read_available()?;
            if bytes == expected {
                trace!("confirmed write acked on attempt {attempt}");
                self.ack.advance();
                return Ok(());
            }
            warn!("confirmed write mismatch on attempt {attempt}: got {bytes:?}");
        }
        Err(BscEngineError::RetriesExhausted)
    }

    /// Reads one complete message: a recognised control character, or a
    /// header block plus any ETB-terminated continuations.
    pub fn read_message(&mut self) -> Result<ReadOutcome, BscEngineError> {
        let first = self.link.read_available()?;
        if let Some(control) = control::recognize(&first) {
            return Ok(ReadOutcome::Control(control));
        }

        let decoded = block::decode(&first)?;
        self.send_ack()?;

        let mut header = decoded.header;
        let mut body = decoded.body;
        let mut terminator = decoded.terminator;

        while terminator == block::Terminator::Etb {
            let next = self.link.read_available()?;
            let decoded = block::decode(&next)?;
            if header.is_none() {
                header = decoded.header;
            }
            body.extend_from_slice(&decoded.body);
            terminator = decoded.terminator;
            self.send_ack()?;
        }

        self.receive_eot(true)?;
        Ok(ReadOutcome::Message { header, body })
    }

    /// Handshakes, confirmed-writes a single block, then sends EOT. `body`
    /// is right-padded with `\r` if it doesn't already end with one.
    pub fn send_short_message(&mut self, header: &[u8; 6], body: &[u8]) -> Result<(), BscEngineError> {
        let mut padded = body.to_vec();
        if padded.last() != Some(&b'\r') {
            padded.push(b'\r');
        }

        self.send_handshake()?;
        let blocks = block::encode(header, &padded, Encoding::Plain);
        debug!("sending short message {:?} ({} block(s))", header, blocks.len());
        for blk in &blocks {
            self.confirmed_write(blk)?;
        }
        self.send_eot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::FakeLink;
    use std::collections::VecDeque;

    fn code(s: &str) -> [u8; 6] {
        let mut out = [0u8; 6];
        out.copy_from_slice(s.as_bytes());
        out
    }

    /// A [`Link`] that returns one pre-scripted chunk per `read_available`
    /// call, so tests can model a peer whose writes arrive as genuinely
    /// separate reads (e.g. a block, then later an EOT once our ack made it
    /// back) instead of [`FakeLink`]'s drain-everything-queued semantics.
    struct ScriptedLink {
        reads: VecDeque<Vec<u8>>,
        outbox: Vec<u8>,
    }

    impl ScriptedLink {
        fn new(reads: Vec<Vec<u8>>) -> Self {
            Self {
                reads: reads.into(),
                outbox: Vec::new(),
            }
        }
    }

    impl Link for ScriptedLink {
        fn read_available(&mut self) -> Result<Vec<u8>, LinkError> {
            self.reads.pop_front().ok_or_else(|| {
                LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "ScriptedLink exhausted",
                ))
            })
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.outbox.extend_from_slice(bytes);
            Ok(())
        }

        fn bytes_waiting(&mut self) -> Result<usize, LinkError> {
            Ok(0)
        }
    }

    #[test]
    fn ack_bit_alternates_across_send_ack_calls() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.send_ack().unwrap();
        engine.send_ack().unwrap();
        assert_eq!(&engine.link.outbox, &[0x10, 0x30, 0x10, 0x31]);
    }

    #[test]
    fn send_eot_resets_ack_bit() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.send_ack().unwrap();
        engine.send_eot().unwrap();
        engine.send_ack().unwrap();
        assert_eq!(&engine.link.outbox[3..], &[0x10, 0x30]);
    }

    #[test]
    fn send_handshake_succeeds_on_matching_ack() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.link.feed(&[0x10, 0x30]);
        engine.send_handshake().unwrap();
        assert_eq!(engine.link.outbox, vec![ENQ]);
    }

    #[test]
    fn confirmed_write_succeeds_on_matching_ack() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.link.feed(&[0x10, 0x30]);
        let blk = vec![0xAA];
        engine.confirmed_write(&blk).unwrap();
        assert_eq!(engine.link.outbox, blk);
    }

    #[test]
    fn confirmed_write_fails_when_link_goes_dry_on_mismatch() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.link.feed(&[0x10, 0x31]); // wrong ack (expects ACK0)
        let blk = vec![0xAA];
        assert!(engine.confirmed_write(&blk).is_err());
    }

    #[test]
    fn read_message_single_block_acks_and_clears_eot() {
        let blocks = block::encode(&code("02,001"), b"JOB1\rNOP\rEND\r", Encoding::Plain);
        assert_eq!(blocks.len(), 1);
        let mut engine = BscEngine::new(ScriptedLink::new(vec![blocks[0].clone(), vec![EOT]]));

        match engine.read_message().unwrap() {
            ReadOutcome::Message { header, body } => {
                assert_eq!(header, Some(code("02,001")));
                assert_eq!(body, b"JOB1\rNOP\rEND\r");
            }
            other => panic!("expected Message, got {other:?}"),
        }
        assert_eq!(engine.link.outbox, vec![0x10, 0x30]);
    }

    #[test]
    fn read_message_recognises_bare_control_character() {
        let mut engine = BscEngine::new(FakeLink::new());
        engine.link.feed(&[ENQ]);
        match engine.read_message().unwrap() {
            ReadOutcome::Control(ControlChar::Enq) => {}
            other => panic!("expected Control(Enq), got {other:?}"),
        }
    }

    #[test]
    fn send_short_message_runs_full_handshake_and_eot() {
        let mut engine = BscEngine::new(ScriptedLink::new(vec![
            vec![0x10, 0x30], // handshake ack
            vec![0x10, 0x31], // confirmed-write ack
        ]));
        engine.send_short_message(&code("90,000"), b"0000").unwrap();
        assert_eq!(engine.link.outbox[0], ENQ);
        assert_eq!(engine.link.outbox.last(), Some(&EOT));
    }
}
