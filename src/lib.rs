pub mod accumulate;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod poller;
pub mod processor;
pub mod report;
pub mod requester;
pub mod retriever;
pub mod util;

pub use error::{ExportError, Result};
