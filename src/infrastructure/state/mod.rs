//! File-backed checkpoint persistence.

mod file_store;

pub use file_store::FileStateStore;
