//! Configuration loading and XDG path resolution.

mod config;
mod paths;

pub use config::{AgentConfig, Config, HistoryConfig, ModelConfig};
pub use paths::{APP_NAME, config_file_path, data_dir};
