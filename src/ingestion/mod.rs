//! Data ingestion module - functional pipeline from the IBGE API to object storage

pub mod config;
pub mod fetch;
pub mod parse;
pub mod pipeline;
pub mod reshape;
pub mod schedule;
pub mod scheduler;
pub mod types;
pub mod utils;
pub mod write;

pub use types::*;
