//! Response cache with TTL expiry and in-flight deduplication
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use routelink_common::cache::ResponseCache;
//!
//! let cache: ResponseCache<u32> = ResponseCache::new();
//! cache.write("GET http://api/count", 3, Duration::from_secs(30));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.size, 1);
//! assert_eq!(stats.inserts, 1);
//! ```

pub mod response;
pub mod stats;

pub use response::ResponseCache;
pub use stats::CacheStats;
