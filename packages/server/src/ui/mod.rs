//! WebSocket meeting server: router, connection handlers, and application state.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::{Server, ServerConfig};
