//! Real-time poll relay.
//!
//! Clients hold a WebSocket open, submit votes for the polls in a fixed
//! catalog, and receive the recomputed tally of a poll every time anyone
//! votes on it. See `README.md` for the wire protocol. Each module owns one
//! concern:
//!
//! - [`catalog`] holds the immutable poll definitions loaded at startup.
//! - [`validator`] checks a vote target against the catalog.
//! - [`store`] defines the vote store contract plus the in-memory and
//!   deadline-bounded stores; [`proxy`] implements it against the remote
//!   resource proxy.
//! - [`tally`] folds stored vote records into per-option counts.
//! - [`registry`] tracks open connections and fans messages out to them.
//! - [`coordinator`] serializes the insert, recompute and broadcast steps
//!   per poll.
//! - [`session`] runs one WebSocket connection from open to close.
//! - [`server`] exposes the HTTP routes and the WebSocket endpoint.
//! - [`message`] and [`error`] define the JSON frames and error taxonomy.
//! - [`cli`] parses configuration for the binary.

pub mod catalog;
pub mod cli;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
pub mod tally;
pub mod validator;
