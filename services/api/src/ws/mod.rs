//! WebSocket Device Sessions
//!
//! - `protocol`: JSON control frames exchanged with devices.
//! - `session`: connection lifecycle, from upgrade to teardown.
//! - `conversation`: the per-session phase machine and silence detector.
//! - `cycle`: one generation round, from utterance to speech.
//! - `pipeline`: outbound framing and paced audio delivery.
//! - `registry`: the table of live sessions.

pub mod conversation;
mod cycle;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod session;

pub use session::ws_handler;
