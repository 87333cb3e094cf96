//! Ferry client - sender and receiver transfer engines
//!
//! The sender offers a file under a short session id; the receiver
//! resolves the id through the broker and dials the sender directly. Both
//! engines run on background tasks and report through the single-slot
//! progress channel in `ferry-core`.

pub mod broker;
pub mod config;
pub mod receiver;
pub mod sender;
