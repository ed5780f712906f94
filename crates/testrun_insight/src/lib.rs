#![forbid(unsafe_code)]

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod pattern;
pub mod recommend;
pub mod record;
pub mod snapshot;
pub mod util;

pub use cli::run_from_env;
pub use config::EngineConfig;
pub use error::{InsightError, Result};
pub use record::{RawRow, Status, TestRecord};
pub use snapshot::{AnalyticsSnapshot, assemble, assemble_records, assemble_with_config};
