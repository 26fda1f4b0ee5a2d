//! In-memory key-value store served over a line-oriented TCP protocol.
//!
//! See `README.md` for an overview, usage instructions, and the request
//! grammar. Each module focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`command`] parses and validates one request line into a typed
//!   operation.
//! - [`store`] owns the key-value map behind a single task that drains an
//!   unbounded operation queue, answering each request on its own one-shot
//!   reply channel.
//! - [`server`] accepts TCP connections and runs the per-connection
//!   read-parse-submit-await-write loop.
//! - [`client`] connects to a server, forwarding stdin lines and printing
//!   reply lines for a terminal user.
//!
//! Integration and end-to-end tests use this crate directly to exercise the
//! wire protocol and the store's serialized semantics.

pub mod cli;
pub mod client;
pub mod command;
pub mod server;
pub mod store;
