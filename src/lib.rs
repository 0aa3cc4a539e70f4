#![warn(missing_docs)]
//! Preprocessing of swath sonar data: merging asynchronous navigation and
//! attitude onto survey pings and correcting them for sensor geometry
pub mod ancillary;
#[allow(missing_docs)]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod jumps;
pub mod latency;
pub mod model;
pub mod parser;
pub mod platform;
pub mod series;
pub mod sidefiles;
