//! Chatrelay library.
//!
//! Proxy-side pieces (`api`, `upstream`) and client-side pieces
//! (`session`, `stream`, `transport`) for the streaming chat system.

pub mod api;
pub mod config;
pub mod session;
pub mod stream;
pub mod transport;
pub mod upstream;
