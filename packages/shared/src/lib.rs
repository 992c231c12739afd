//! Utilities shared by the Parole binaries: logging setup and time handling.

pub mod logger;
pub mod time;
