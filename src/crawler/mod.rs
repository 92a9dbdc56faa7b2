//! Crawler module for incremental traversal
//!
//! This module contains the core crawling logic, including:
//! - The crawl engine classifying and unwrapping resources
//! - Handler traits receiving crawl events
//! - Cooperative cancellation and lifecycle state
//! - Retrieval of a single resource by identifier

mod cancel;
mod engine;
mod handler;
mod resolve;
mod state;

pub use cancel::CancelToken;
pub use engine::Crawler;
pub use handler::{CrawlerHandler, SubCrawlerHandler};
pub use resolve::fetch;
pub use state::{CrawlerState, StateWatcher};
