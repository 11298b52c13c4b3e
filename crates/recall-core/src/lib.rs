//! Shared types and the store error taxonomy for the recall workspace.

pub mod error;
pub mod types;

pub use error::StoreError;
pub use types::{AuditOp, AuditRecord, Category, Entry, Role};
