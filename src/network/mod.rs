//! Resource loading for hosted pages
//!
//! Synchronous loading by scheme, a disk cache for HTTP responses, and
//! background fetches delivered back on the owning thread.

pub mod cache;
pub mod fetcher;
pub mod loader;

pub use cache::DiskCache;
pub use fetcher::{FetchCallback, ResourceFetcher};
pub use loader::WebLoader;
