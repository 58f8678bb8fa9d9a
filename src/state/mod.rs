//! State module for tracking crawl progress
//!
//! - `CrawlState`: per-relay lifecycle (pending, in flight, crawled, offline, excluded)

mod crawl_state;

pub use crawl_state::CrawlState;
