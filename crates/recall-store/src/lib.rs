//! Durable JSON storage: categorized entry collections, the append-only
//! audit log, and a small state file for background bookkeeping.

mod audit;
mod state;
mod store;

pub use audit::AuditLog;
pub use state::StateFile;
pub use store::EntryStore;
