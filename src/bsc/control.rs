//! BSC control characters and the composite two-byte DLE sequences built on
//! top of them.

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ENQ: u8 = 0x05;
pub const DLE: u8 = 0x10;
pub const NAK: u8 = 0x15;
pub const ETB: u8 = 0x17;

pub const ACK0: [u8; 2] = [DLE, 0x30];
pub const ACK1: [u8; 2] = [DLE, 0x31];
pub const WACK: [u8; 2] = [DLE, 0x6B];
pub const RVI: [u8; 2] = [DLE, 0x7C];
pub const TTD: [u8; 2] = [STX, ENQ];

/// A recognised BSC control character or composite sequence, for bytes that
/// don't begin a framed block (i.e. don't start with SOH or STX, except for
/// the lone TTD sequence which happens to start with STX).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChar {
    Etx,
    Eot,
    Enq,
    Dle,
    Nak,
    Etb,
    Ack0,
    Ack1,
    Wack,
    Rvi,
    Ttd,
}

/// Recognises `bytes` as exactly one control character or composite
/// sequence. Returns `None` if `bytes` doesn't match any of them.
pub fn recognize(bytes: &[u8]) -> Option<ControlChar> {
    match bytes {
        [ETX] => Some(ControlChar::Etx),
        [EOT] => Some(ControlChar::Eot),
        [ENQ] => Some(ControlChar::Enq),
        [DLE] => Some(ControlChar::Dle),
        [NAK] => Some(ControlChar::Nak),
        [ETB] => Some(ControlChar::Etb),
        _ if bytes == ACK0.as_slice() => Some(ControlChar::Ack0),
        _ if bytes == ACK1.as_slice() => Some(ControlChar::Ack1),
        _ if bytes == WACK.as_slice() => Some(ControlChar::Wack),
        _ if bytes == RVI.as_slice() => Some(ControlChar::Rvi),
        _ if bytes == TTD.as_slice() => Some(ControlChar::Ttd),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_single_byte_controls() {
        assert_eq!(recognize(&[EOT]), Some(ControlChar::Eot));
        assert_eq!(recognize(&[ENQ]), Some(ControlChar::Enq));
    }

    #[test]
    fn does_not_recognize_lone_soh_or_stx() {
        assert_eq!(recognize(&[SOH]), None);
        assert_eq!(recognize(&[STX]), None);
    }

    #[test]
    fn recognizes_dle_composites() {
        assert_eq!(recognize(&ACK0), Some(ControlChar::Ack0));
        assert_eq!(recognize(&ACK1), Some(ControlChar::Ack1));
        assert_eq!(recognize(&WACK), Some(ControlChar::Wack));
        assert_eq!(recognize(&RVI), Some(ControlChar::Rvi));
    }

    #[test]
    fn recognizes_ttd() {
        assert_eq!(recognize(&TTD), Some(ControlChar::Ttd));
    }

    #[test]
    fn does_not_recognize_framed_blocks() {
        assert_eq!(recognize(&[SOH, b'0', b'2', b',', b'0', b'0', b'1', STX]), None);
    }
}
