//! WebSocket fan-out: bounded-history hub plus the subscriber handler.
//!
//! ```text
//! TwitchAdapter ──┐
//!                 ├─> ChatHub ──> every connected WebSocket subscriber
//! YouTubeAdapter ─┘    (50-message replay for new connections)
//! ```

mod handler;
mod hub;

pub use handler::{ws_handler, AppState};
pub use hub::{ChatHub, HISTORY_CAPACITY};
