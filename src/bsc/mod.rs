//! BSC-style ERC engine: block framing, link-layer acknowledgement, and
//! transaction dispatch over a 9600 baud, 8E1 link.

pub mod ack;
pub mod block;
pub mod codes;
pub mod control;
pub mod engine;
pub mod transaction;

pub use block::{BlockError, DecodedBlock, Encoding, Terminator};
pub use codes::TransactionCode;
pub use control::ControlChar;
pub use engine::{BscEngine, BscEngineError, ReadOutcome};
pub use transaction::{BscTransactionLayer, ExecResult, TransactionError};
