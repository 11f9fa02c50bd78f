pub mod annotator;
pub mod cli;
pub mod config;
pub mod executor;
pub mod files;
pub mod sandbox;
pub mod snippet;
pub mod types;

// Re-export main types
pub use types::*;

// Re-export the entry points for convenience
pub use config::Config;
pub use executor::{execute, execute_code, execute_selection, ExecuteOptions};
pub use files::save_file;
