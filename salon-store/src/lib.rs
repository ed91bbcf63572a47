pub mod app_config;
pub mod memory;
pub mod redis_repo;
pub mod seed;

pub use app_config::{Config, StoreBackend};
pub use memory::MemoryStore;
pub use redis_repo::RedisStore;
pub use seed::seed_reference_data;
