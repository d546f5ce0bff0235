//! HTTP Server
//!
//! REST API over the twin registry. Every successful mutation is announced on
//! the event bus.

mod handler;
mod protocol;
mod router;
mod state;

pub use handler::*;
pub use protocol::*;
pub use router::*;
pub use state::*;
