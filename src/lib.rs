//! Host-side tooling for the YASNAC ERC-series robot controller's serial links.
//!
//! Two independent protocol engines live here:
//!
//! - [`fc1`] emulates the FC1 floppy disk controller the robot expects to find
//!   on its 4800 baud drive port, backing it with arbitrary host storage.
//! - [`bsc`] implements the Binary-Synchronous-Communications-like protocol
//!   the robot speaks on its 9600 baud "ERC" link, in both server (the robot
//!   drives the transaction) and client (the host drives it) roles.
//!
//! Both engines are built on the same [`link::Link`] abstraction, so the only
//! thing that differs between talking to real hardware and a test harness is
//! which `Link` implementation is plugged in.

pub mod bsc;
pub mod fc1;
pub mod fs;
pub mod link;
