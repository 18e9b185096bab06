//! Configuration loading.

mod file_config;
mod loader;

pub use file_config::{
    FileConfig, FileGatherConfig, FileMonitorConfig, FileProviderConfig, FileRoundConfig,
    FileSessionConfig, FileVoiceConfig,
};
pub use loader::ConfigLoader;
