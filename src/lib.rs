pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod service;
pub mod verification;

pub use config::AppConfig;
pub use corpus::{HistoricalCorpus, MemoryCorpus};
pub use db::create_pool;
pub use error::{AppError, EngineError};
pub use service::{BatchSummary, ComplianceEngine};
