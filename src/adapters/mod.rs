//! Adapters implementing the ports in `crate::ports`.

pub mod argon2_hasher;
pub mod memory_store;
pub mod notifier;
pub mod postgres_store;

pub use argon2_hasher::Argon2Hasher;
pub use memory_store::MemoryStore;
pub use notifier::{LogNotifier, MailRelayNotifier};
pub use postgres_store::PostgresStore;
