//! Persistence layer: sessions, memory profiles and cached research.

mod libsql_backend;
mod memory;
pub mod migrations;
mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
pub use traits::InterviewStore;
