//! Browser-side components: session handling, the selector-fallback probe, pagination,
//! schema extraction and the import executor.

pub mod browser;
pub mod import;
pub mod pagination;
pub mod probe;
pub mod schema;
pub mod selectors;
pub mod session;

pub use browser::BrowserSession;
pub use import::{
    BrowserImportSurface, ImportExecutor, ImportStage, ImportSurface, ProgressSnapshot, RollbackConfirmed,
};
pub use pagination::{Activation, PagedView, Paginator};
pub use probe::{ControlProbe, Requirement, Selector};
pub use schema::SchemaResolver;
pub use session::{AuthOutcome, SessionDriver};
