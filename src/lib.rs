//! Automated bulk-import engine: logs into the target administration UI, extracts an
//! import format's field schema, resolves its reference lists over REST, validates a
//! spreadsheet against both and submits it in rollback mode.

pub mod auth;
pub mod chromedriver_manager;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod models;
pub mod reference;
pub mod scraper;
pub mod validation;
pub mod workflow;

pub use config::AppConfig;
pub use context::RunContext;
pub use error::{EngineError, EngineResult};
pub use workflow::{ImportWorkflow, Prefetched, WorkflowOutcome};
