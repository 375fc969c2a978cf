//! Support library for the `nesthill` binary.
//!
//! Exposes the command pipeline and logging setup so tests and doctests can
//! drive commands in-process.

pub mod cli;
pub mod logging;
