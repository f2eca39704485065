//! In-memory implementation of the memory store port.

mod in_memory;

pub use in_memory::{InMemoryStore, ScopeRecord};
