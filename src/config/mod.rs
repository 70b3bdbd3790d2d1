pub mod builder;
pub mod defaults;
pub mod merge;
pub mod types;


pub use builder::ConfigBuilder;
pub use types::*;

use crate::error::{FixtureError, Result};
use std::path::{Path, PathBuf};

/// Main configuration loading function
///
/// A missing file yields an empty input so flags and environment alone can drive the CLI.
pub fn load_config(config_file: &str) -> Result<(ConfigInput, PathBuf)> {
    let config_dir = Path::new(config_file)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config_input = if Path::new(config_file).exists() {
        let contents = std::fs::read_to_string(config_file)?;
        parse_config(&contents)
            .map_err(|e| FixtureError::Configuration(format!("{}: {}", config_file, e)))?
    } else {
        ConfigInput::default()
    };

    Ok((config_input, config_dir))
}

pub fn parse_config(contents: &str) -> std::result::Result<ConfigInput, serde_yaml::Error> {
    serde_yaml::from_str(contents)
}
