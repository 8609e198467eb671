//! FC1 floppy-disk-controller emulation: framing and the request/response
//! engine that serves a peer over a 4800 baud, 8E1 link.

pub mod engine;
pub mod frame;

pub use engine::{Fc1Engine, Fc1EngineError};
pub use frame::{decode_stream, encode_frame, DecodeOutcome, FrameError};
