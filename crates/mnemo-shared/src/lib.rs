//! # Mnemo Shared
//!
//! Cross-cutting components used by every mnemo crate:
//!
//! - **config**: typed, environment-derived configuration
//! - **error**: stable wire error codes and the tool-layer error type
//! - **ident**: project identifier normalization
//! - **logging**: JSON tracing-subscriber bootstrap
//! - **telemetry**: counters, histograms, and OTLP span pipeline
//! - **time**: UTC timestamp helpers

pub mod config;
pub mod error;
pub mod ident;
pub mod logging;
pub mod telemetry;
pub mod time;

pub use config::{ServerConfig, WatchdogAction, WatchdogConfig};
pub use error::{ErrorCode, ToolError};
pub use ident::{normalize_project_id, ProjectIdError, GLOBAL_PROJECT_ID};
