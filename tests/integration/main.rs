//! Ferry integration test harness.
//!
//! End-to-end transfers over both channel variants: the in-process lossy
//! channel and the embedded broker. Tests share nothing but the temp
//! directory; each one wires its own channel, splitter, and assembler.
//!
//!   cargo test --test integration
//!
//! Set RUST_LOG=ferry_transfer=debug to watch the protocol converse.

mod broker;
mod direct;
mod util;
