//! Persistence layer: libSQL-backed ticket storage.

pub mod gateway;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use gateway::PersistenceGateway;
pub use libsql_backend::LibSqlBackend;
pub use traits::{StoredTicket, TicketStore};
