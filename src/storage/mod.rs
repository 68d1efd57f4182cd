pub mod cache;
pub mod disk_cache;

pub use cache::{CacheEntry, CacheStats};
pub use disk_cache::{CacheIssue, CacheSession, DEFAULT_TTL};
