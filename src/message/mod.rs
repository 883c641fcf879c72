//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer. The trait then provides
//! default implementations for broadcast, reduce, and reduce-all operations.
//! Three transports are included: a serial communicator with no peers, an
//! in-process communicator whose ranks run on threads, and a pure-Rust TCP
//! communicator with one process per rank.
//!

mod backoff;
pub mod comm;
pub mod tcp;
pub mod thread;
pub mod util;

pub use comm::{Communicator, SerialCommunicator};
pub use tcp::TcpCommunicator;
pub use thread::ThreadCommunicator;
