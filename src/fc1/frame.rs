//! FC1 frame encoding/decoding: `0x02 | LEN_LO | LEN_HI | PAYLOAD[LEN] | CHK_LO | CHK_HI`.

use thiserror::Error;

/// Byte that starts every FC1 frame.
pub const FRAME_START: u8 = 0x02;

/// Maximum payload size: a three-letter verb plus up to 255 data bytes.
pub const MAX_PAYLOAD_LEN: usize = 258;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte FC1 limit")]
    PayloadTooLarge(usize),
    #[error("buffer does not contain enough bytes for a full frame yet")]
    NeedMore,
    #[error("buffer does not start with a valid FC1 frame header")]
    InvalidHeader,
}

/// Successful decode: the frame's payload and how many bytes of the input
/// buffer it consumed.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub payload: Vec<u8>,
    pub consumed: usize,
}

fn checksum(length_and_payload: &[u8]) -> u16 {
    let sum: u32 = length_and_payload.iter().map(|&b| b as u32).sum();
    (65536u32.wrapping_sub(sum) % 65536) as u16
}

/// Encodes `payload` as a single FC1 frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }

    let len = payload.len() as u16;
    let mut length_and_payload = Vec::with_capacity(2 + payload.len());
    length_and_payload.extend_from_slice(&len.to_le_bytes());
    length_and_payload.extend_from_slice(payload);

    let chk = checksum(&length_and_payload);

    let mut frame = Vec::with_capacity(1 + length_and_payload.len() + 2);
    frame.push(FRAME_START);
    frame.extend_from_slice(&length_and_payload);
    frame.extend_from_slice(&chk.to_le_bytes());
    Ok(frame)
}

/// Attempts to decode a single frame from the front of `buffer`.
///
/// On success, the caller should advance its rolling buffer by
/// `DecodeOutcome::consumed` bytes. On [`FrameError::InvalidHeader`], the
/// caller's resync policy is to slide the buffer forward by one byte and
/// retry. On [`FrameError::NeedMore`], the caller should block for more
/// input and retry once it arrives.
pub fn decode_stream(buffer: &[u8]) -> Result<DecodeOutcome, FrameError> {
    if buffer.is_empty() || buffer[0] != FRAME_START {
        return Err(FrameError::InvalidHeader);
    }
    if buffer.len() < 5 {
        return Err(FrameError::NeedMore);
    }

    let len = u16::from_le_bytes([buffer[1], buffer[2]]) as usize;
    let total = len + 5;
    if buffer.len() < total {
        return Err(FrameError::NeedMore);
    }

    let length_and_payload = &buffer[1..3 + len];
    let expected = checksum(length_and_payload);
    let stated = u16::from_le_bytes([buffer[3 + len], buffer[4 + len]]);
    if stated != expected {
        return Err(FrameError::InvalidHeader);
    }

    Ok(DecodeOutcome {
        payload: buffer[3..3 + len].to_vec(),
        consumed: total,
    })
}
