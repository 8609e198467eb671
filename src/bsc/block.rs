//! BSC block encoding/decoding: `SOH HDR[6] STX BODY[<=256] (ETX|ETB) CHK[2]`
//! for the first block of a message, `STX BODY[<=256] (ETX|ETB) CHK[2]` for
//! continuation blocks.

use thiserror::Error;

use super::control::{ETB, ETX, SOH, STX};

/// Max body bytes carried by a single block.
pub const MAX_BODY_LEN: usize = 256;

/// How a message's body is split across blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// The whole body is chunked into `<=256`-byte blocks.
    Plain,
    /// The body is split at the first `\r`; the prefix (including the `\r`)
    /// becomes block 0's entire body regardless of length, and the
    /// remainder is chunked normally.
    NamePrefixed,
}

/// Which control byte terminates a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Last block of the message.
    Etx,
    /// More blocks follow.
    Etb,
}

impl Terminator {
    fn byte(self) -> u8 {
        match self {
            Terminator::Etx => ETX,
            Terminator::Etb => ETB,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("block does not start with SOH or STX")]
    InvalidStart,
    #[error("block is incomplete")]
    NeedMore,
    #[error("no ETX/ETB terminator found within the maximum body length")]
    InvalidBody,
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    InvalidChecksum { stored: u16, computed: u16 },
}

/// A decoded block.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedBlock {
    /// The six-byte transaction code, present only on the first block of a
    /// message.
    pub header: Option<[u8; 6]>,
    pub body: Vec<u8>,
    pub terminator: Terminator,
    /// Total bytes of the input this block consumed.
    pub consumed: usize,
}

fn checksum(region: &[u8]) -> u16 {
    let sum: u32 = region.iter().map(|&b| b as u32).sum();
    (sum % 65536) as u16
}

/// Encodes `header_code` (exactly six ASCII bytes) and `body` as a sequence
/// of raw block byte strings, per `encoding`.
pub fn encode(header_code: &[u8; 6], body: &[u8], encoding: Encoding) -> Vec<Vec<u8>> {
    let (body0, rest): (&[u8], &[u8]) = match encoding {
        Encoding::Plain => {
            let split = body.len().min(MAX_BODY_LEN);
            (&body[..split], &body[split..])
        }
        Encoding::NamePrefixed => match body.iter().position(|&b| b == b'\r') {
            Some(cr) => body.split_at(cr + 1),
            None => (body, &[]),
        },
    };

    let mut chunks: Vec<&[u8]> = vec![body0];
    let mut remaining = rest;
    while !remaining.is_empty() {
        let split = remaining.len().min(MAX_BODY_LEN);
        let (chunk, tail) = remaining.split_at(split);
        chunks.push(chunk);
        remaining = tail;
    }

    let last_index = chunks.len() - 1;
    let mut blocks = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        let terminator = if index == last_index {
            Terminator::Etx
        } else {
            Terminator::Etb
        };

        let mut block = Vec::new();
        if index == 0 {
            block.push(SOH);
            block.extend_from_slice(header_code);
        }
        block.push(STX);
        block.extend_from_slice(chunk);
        block.push(terminator.byte());

        let checksum_region_start = if index == 0 { 1 } else { 0 };
        let chk = checksum(&block[checksum_region_start..]);
        block.extend_from_slice(&chk.to_le_bytes());

        blocks.push(block);
    }

    blocks
}

/// Decodes a single raw block, which must be exactly one block's worth of
/// bytes (no trailing garbage, no partial block unless it genuinely needs
/// more input).
pub fn decode(buffer: &[u8]) -> Result<DecodedBlock, BlockError> {
    let (header, header_len): (Option<[u8; 6]>, usize) = if buffer.first() == Some(&SOH) {
        if buffer.len() < 8 {
            return Err(BlockError::NeedMore);
        }
        let mut code = [0u8; 6];
        code.copy_from_slice(&buffer[1..7]);
        if buffer[7] != STX {
            return Err(BlockError::InvalidStart);
        }
        (Some(code), 8)
    } else if buffer.first() == Some(&STX) {
        (None, 1)
    } else {
        return Err(BlockError::InvalidStart);
    };

    let body_start = header_len;
    let max_scan = body_start + MAX_BODY_LEN; // last index a terminator could legally sit at
    let scan_limit = max_scan.min(buffer.len().saturating_sub(1));

    let mut terminator_index = None;
    let mut i = body_start;
    while i <= scan_limit {
        if buffer[i] == ETX || buffer[i] == ETB {
            terminator_index = Some(i);
            break;
        }
        i += 1;
    }

    let terminator_index = match terminator_index {
        Some(idx) => idx,
        None => {
            if buffer.len() < body_start + MAX_BODY_LEN + 1 {
                return Err(BlockError::NeedMore);
            } else {
                return Err(BlockError::InvalidBody);
            }
        }
    };

    if buffer.len() < terminator_index + 3 {
        return Err(BlockError::NeedMore);
    }

    let checksum_region_start = if header.is_some() { 1 } else { 0 };
    let computed = checksum(&buffer[checksum_region_start..=terminator_index]);
    let stored = u16::from_le_bytes([buffer[terminator_index + 1], buffer[terminator_index + 2]]);
    if stored != computed {
        return Err(BlockError::InvalidChecksum { stored, computed });
    }

    let terminator = match buffer[terminator_index] {
        ETX => Terminator::Etx,
        ETB => Terminator::Etb,
        _ => unreachable!("only ETX/ETB are matched as terminators"),
    };

    Ok(DecodedBlock {
        header,
        body: buffer[body_start..terminator_index].to_vec(),
        terminator,
        consumed: terminator_index + 3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> [u8; 6] {
        let bytes = s.as_bytes();
        let mut out = [0u8; 6];
        out.copy_from_slice(bytes);
        out
    }

    #[test]
    fn encodes_single_block_message() {
        let blocks = encode(&code("90,000"), b"0000\r", Encoding::Plain);
        assert_eq!(blocks.len(), 1);
        let decoded = decode(&blocks[0]).unwrap();
        assert_eq!(decoded.header, Some(code("90,000")));
        assert_eq!(decoded.body, b"0000\r");
        assert_eq!(decoded.terminator, Terminator::Etx);
        assert_eq!(decoded.consumed, blocks[0].len());
    }

    #[test]
    fn checksum_round_trips_for_every_block() {
        let body = vec![b'x'; 600];
        let blocks = encode(&code("02,001"), &body, Encoding::Plain);
        for block in &blocks {
            decode(block).unwrap();
        }
    }

    #[test]
    fn exactly_256_byte_body_is_one_block() {
        let body = vec![b'a'; 256];
        let blocks = encode(&code("02,001"), &body, Encoding::Plain);
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn exactly_257_byte_body_is_two_blocks() {
        let body = vec![b'a'; 257];
        let blocks = encode(&code("02,001"), &body, Encoding::Plain);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn only_last_block_carries_etx() {
        let body = vec![b'a'; 600];
        let blocks = encode(&code("02,001"), &body, Encoding::Plain);
        for (i, block) in blocks.iter().enumerate() {
            let decoded = decode(block).unwrap();
            if i == blocks.len() - 1 {
                assert_eq!(decoded.terminator, Terminator::Etx);
            } else {
                assert_eq!(decoded.terminator, Terminator::Etb);
            }
        }
    }

    #[test]
    fn name_prefixed_splits_at_first_cr_regardless_of_length() {
        let mut body = b"JOB1\r".to_vec();
        body.extend(vec![b'z'; 300]);
        let blocks = encode(&code("02,001"), &body, Encoding::NamePrefixed);
        let first = decode(&blocks[0]).unwrap();
        assert_eq!(first.body, b"JOB1\r");
        assert_eq!(first.terminator, Terminator::Etb);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn continuation_block_has_no_header() {
        let body = vec![b'a'; 300];
        let blocks = encode(&code("02,001"), &body, Encoding::Plain);
        let second = decode(&blocks[1]).unwrap();
        assert_eq!(second.header, None);
    }

    #[test]
    fn invalid_start_on_garbage() {
        assert_eq!(decode(&[0x99, 0x00]), Err(BlockError::InvalidStart));
    }

    #[test]
    fn need_more_on_truncated_block() {
        let blocks = encode(&code("90,000"), b"0000\r", Encoding::Plain);
        assert_eq!(
            decode(&blocks[0][..blocks[0].len() - 1]),
            Err(BlockError::NeedMore)
        );
    }

    #[test]
    fn invalid_checksum_on_corruption() {
        let mut blocks = encode(&code("90,000"), b"0000\r", Encoding::Plain);
        let last = blocks[0].len() - 1;
        blocks[0][last] ^= 0xFF;
        assert!(matches!(decode(&blocks[0]), Err(BlockError::InvalidChecksum { .. })));
    }

    proptest::proptest! {
        #[test]
        fn prop_checksum_round_trips(
            header in "[0-9]{2},[0-9]{3}",
            body in proptest::collection::vec(proptest::prelude::any::<u8>().prop_filter("no control bytes", |b| !matches!(*b, 0x01..=0x05 | 0x10 | 0x15 | 0x17)), 0..600),
        ) {
            let mut code_bytes = [0u8; 6];
            code_bytes.copy_from_slice(header.as_bytes());
            let blocks = encode(&code_bytes, &body, Encoding::Plain);
            for block in &blocks {
                proptest::prop_assert!(decode(block).is_ok());
            }
        }
    }
}
