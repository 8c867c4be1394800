//! Relay services used by the websocket route.
//!
//! Service modules own the fan-out, session-record, and retention logic so
//! the websocket handler can stay focused on protocol translation.

pub mod relay;
pub mod retention;
pub mod session;
