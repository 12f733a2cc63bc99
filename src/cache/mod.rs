pub mod backend;
pub mod redis_backend;
pub mod token;
pub mod token_cache;
