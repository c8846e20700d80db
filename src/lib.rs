// Core modules
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod journal;
pub mod models;
pub mod position;
pub mod risk;
pub mod selector;
pub mod strategy;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::{ConfigError, ExchangeError, SizingError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
