pub mod database;
pub mod database_audit;
pub mod database_cache;
pub mod database_rules;
pub mod database_usage;
pub mod memory;

pub use database::GatewayStore;
pub use memory::MemoryStore;
