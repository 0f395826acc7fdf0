//! Rule-based re-delivery of captured inbound mail.

pub mod config;
pub mod error;
pub mod forward;
pub mod handler;
pub mod store;
pub mod transport;
