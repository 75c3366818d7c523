//! # Application State
//!
//! The shared application state (`AppState`) holds the transcoder, built from
//! the configuration at startup. Nothing in it is mutable: every request
//! launches its own tool process and owns its own stream.

use crate::config::AppConfig;
use std::sync::Arc;
use tagstream::{ExifToolLauncher, ToolLauncher, Transcoder};
use tracing::info;

/// The shared application state, accessible from all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub transcoder: Transcoder,
}

impl AppState {
    /// Builds the state around an explicit launcher, e.g. a scripted one in tests.
    pub fn with_launcher(config: &AppConfig, launcher: Arc<dyn ToolLauncher>) -> Self {
        Self {
            transcoder: Transcoder::new(launcher).with_channel_capacity(config.channel_capacity),
        }
    }
}

/// Builds the shared application state from the configuration, using the
/// configured tool binary.
pub fn build_app_state(config: AppConfig) -> AppState {
    let launcher = ExifToolLauncher::new(config.tool.program.clone(), config.tool.args.clone());
    info!(
        program = %config.tool.program,
        args = ?config.tool.args,
        "Configured catalog tool."
    );
    AppState::with_launcher(&config, Arc::new(launcher))
}
