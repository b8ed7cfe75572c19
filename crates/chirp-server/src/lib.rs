//! # chirp-server
//!
//! A time-ordered feed of posts and the dispatcher that applies a stream
//! of requests to it.
//!
//! ## Modules
//!
//! - `feed` - Sorted post list guarded by the bounded-reader RW lock
//! - `request` - Request / response records and their JSON shape
//! - `codec` - JSON request source and response sinks
//! - `config` - Run mode and consumer count (env + command line)
//! - `dispatch` - Sequential loop and producer/consumer pipeline
//! - `error` - Error types

pub mod feed;
pub mod request;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;

// Re-exports for convenience
pub use feed::{Post, TimeOrderedFeed};
pub use request::{Command, Request, Response};
pub use codec::{JsonSink, JsonSource, MemorySink, ResponseSink};
pub use config::{Mode, ServerConfig};
pub use dispatch::{apply, DispatchStats, Dispatcher};
pub use error::{ServerError, ServerResult};
