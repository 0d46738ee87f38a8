//! Concrete implementations of the pipeline's collaborators

pub mod jsonl;
pub mod log;
pub mod memory;

pub use jsonl::JsonlAuditStore;
pub use log::TracingNotifier;
pub use memory::{InMemoryAuditStore, InMemoryFleet, InMemoryNotifier};
