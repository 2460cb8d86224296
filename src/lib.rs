//! Library crate for webgrab-scan: bulk probing, classification and durable
//! multi-format recording of web interfaces on large host lists.
pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod merge;
pub mod probe;
pub mod progress;
pub mod renderer;
pub mod scanner;
pub mod shutdown;
pub mod sink;
pub mod targets;
pub mod throughput;
pub mod types;
