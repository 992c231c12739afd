//! Record Store implementations.

pub mod inmemory;

pub use inmemory::InMemoryRecordStore;
