//! # Application Configuration
//!
//! This module defines the configuration structure for the `tagstream-server`
//! and loads it from environment variables. There is no configuration file:
//! the defaults reproduce the fixed `exiftool -listx` invocation, and the
//! environment can only move the port or point at a different tool binary.
//!
//! - `PORT` sets the listening port (default `8080`).
//! - `TAGSTREAM_TOOL__PROGRAM` and `TAGSTREAM_TOOL__ARGS` (space separated)
//!   override the tool invocation.
//! - `TAGSTREAM_CHANNEL_CAPACITY` bounds the chunks buffered per response.

use config::{Config as ConfigBuilder, Environment};
use serde::Deserialize;
use tagstream::transcoder::DEFAULT_CHANNEL_CAPACITY;
use tagstream::ExifToolLauncher;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// A value was read but is not usable.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Encoded chunks buffered between the transcoder and a slow client.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// The catalog tool invocation.
    #[serde(default)]
    pub tool: ToolConfig,
}

/// Which program to run for the tag catalog, and with which arguments.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            channel_capacity: default_channel_capacity(),
            tool: ToolConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_program() -> String {
    ExifToolLauncher::DEFAULT_PROGRAM.to_string()
}

fn default_args() -> Vec<String> {
    ExifToolLauncher::DEFAULT_ARGS
        .iter()
        .map(|a| a.to_string())
        .collect()
}

/// Loads the application configuration from environment variables.
///
/// - Top-level keys like `port` are read from `PORT`.
/// - Nested keys are read from `TAGSTREAM_...` variables (e.g. `TAGSTREAM_TOOL__PROGRAM`).
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let settings = ConfigBuilder::builder()
        // Layer 1: Plain environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 2: Prefixed environment variables for the tool invocation.
        .add_source(
            Environment::with_prefix("TAGSTREAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("tool.args"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;

    if config.tool.program.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "tool.program must not be empty".to_string(),
        ));
    }
    if config.channel_capacity == 0 {
        return Err(ConfigError::Invalid(
            "channel_capacity must be at least 1".to_string(),
        ));
    }

    Ok(config)
}
