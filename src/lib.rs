//! cachepipe - build cache validation pipeline
//!
//! Fetches a split Yocto build-cache release, reassembles and verifies
//! it, extracts it into a workspace, runs a containerized build against
//! it and reports how effective the cache was.

pub mod analysis;
pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod orchestration;
pub mod pipeline;
pub mod platform;
pub mod ui;
pub mod workspace;

pub use error::{CachePipeError, CachePipeResult};
