pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingest;
pub mod jobs;
pub mod model;
