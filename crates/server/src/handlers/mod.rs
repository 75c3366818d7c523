//! # API Route Handlers
//!
//! This module organizes the Axum route handlers for the `tagstream-server`.

pub mod general;
pub mod tags;

// Re-export all handlers so the router can reach them under `handlers::`.
pub use general::*;
pub use tags::*;

// Shared items used by the handler modules.
use super::{errors::AppError, state::AppState};
