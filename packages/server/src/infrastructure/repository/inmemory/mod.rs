//! インメモリ実装

mod store;

pub use store::InMemoryRecordStore;
