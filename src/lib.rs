// Core modules
pub mod analysis;
pub mod api;
pub mod cache;
pub mod dashboard;
pub mod db;
pub mod export;
pub mod fetcher;
pub mod indicators;
pub mod models;
pub mod settings;

// Re-export commonly used types
pub use analysis::Analyzer;
pub use models::*;
pub use settings::Settings;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
