//! Data Transfer Objects (DTOs) for the meeting server.
//!
//! DTOs are organized by protocol:
//! - `websocket`: request, response and broadcast envelopes plus record payloads
//! - `http`: HTTP API response DTOs
//! - `conversion`: domain entity → DTO conversions

pub mod conversion;
pub mod http;
pub mod websocket;
