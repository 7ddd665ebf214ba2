//! Chatmux library.
//!
//! Ingests live chat from Twitch (IRC) and YouTube (polled REST), normalizes
//! both into one message shape, and fans the stream out to WebSocket
//! subscribers with a bounded replay buffer.

pub mod message;
pub mod render;
pub mod twitch;
pub mod ws;
pub mod youtube;
