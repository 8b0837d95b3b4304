//! Point-in-time report of listening sockets and the processes that own them,
//! in the spirit of `netstat -nlp`.
//!
//! The pipeline is three independent collectors joined by one reconciler:
//! a process directory ([`directory`]), a socket enumerator ([`sockets`]) and
//! a lazily-probed kernel RPC registry ([`rpc`]) for sockets no process owns.

pub mod directory;
pub mod docker;
pub mod models;
pub mod report;
pub mod rpc;
pub mod sockets;
