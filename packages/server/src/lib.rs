//! Real-time meeting server library.
//!
//! Clients connect over WebSocket, authenticate, create and join meetings, exchange
//! chat messages, and request the floor; the server routes each request to a
//! domain handler and fans results out to the meeting's live audience.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
