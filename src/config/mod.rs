//! Configuration module for Relay-Atlas
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so running without a file is valid.
//!
//! # Example
//!
//! ```no_run
//! use relay_atlas::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("relay-atlas.toml")).unwrap();
//! println!("Crawler will retry {} times", config.crawler.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, DEFAULT_SEED};

// Re-export parser functions
pub use parser::{
    compute_config_hash, compute_content_hash, load_config, load_config_with_hash, parse_config,
};
pub use validation::{validate, validate_seed};
