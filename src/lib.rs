//! # webshot
//!
//! A caching thumbnail service for rendered web pages. A request names a
//! resource and a variant; the service captures the page with headless Chrome,
//! resizes and crops the screenshot into a small PNG, and keeps the result in
//! a size-bounded in-memory cache.
//!
//! ## Request flow
//!
//! 1. The HTTP layer validates `/{resourceId}.png?d={variant}` and builds the
//!    key `resourceId@variant`.
//! 2. [`ThumbnailCache::get`] returns a cached thumbnail, joins a production
//!    already running for the key, or starts one.
//! 3. [`PipelineRunner`] captures `<run_url>/<resourceId>/`, pipes the bytes
//!    through the transform and collects the PNG.
//! 4. Successful thumbnails are stored and the least recently used entries are
//!    evicted once the summed size passes the capacity. Failures are handed to
//!    every waiter and never stored.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webshot::{
//!     CacheMetrics, ChromeCapture, Config, ImageTransform, PipelineRunner, ThumbnailCache,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         run_url: Some("https://run.example.com/plunks".to_string()),
//!         ..Default::default()
//!     };
//!     let capture = Arc::new(ChromeCapture::launch(&config.capture).await?);
//!     let runner = PipelineRunner::from_config(&config, capture, Arc::new(ImageTransform))?;
//!     let cache = ThumbnailCache::new(config.cache_capacity, Arc::new(runner), CacheMetrics::noop());
//!
//!     let png = cache.get("abc123@v1").await?;
//!     println!("Thumbnail: {} bytes", png.len());
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! webshot --run-url https://run.example.com/plunks --port 8080 serve
//! webshot --run-url https://run.example.com/plunks render --id abc123 --variant v1 --output abc123.png
//! webshot validate --config config.json
//! ```

/// Configuration and settings for the thumbnail service
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Compound cache keys
pub mod key;

/// Page capture through headless Chrome
pub mod capture;

/// Resize, crop and encode
pub mod transform;

/// Capture → transform → collect
pub mod pipeline;

/// Size-weighted LRU table
pub mod eviction;

/// Single-flight thumbnail cache
pub mod cache;

/// Performance metrics collection
pub mod metrics;

/// Health reporting for the service
pub mod health;

/// HTTP routes
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Utility functions and helpers
pub mod utils;


pub use self::metrics::*;
pub use cache::*;
pub use capture::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use eviction::*;
pub use health::*;
pub use key::*;
pub use pipeline::*;
pub use server::*;
pub use transform::*;
pub use utils::*;
