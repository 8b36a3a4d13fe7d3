//! Sequential pipeline: authenticate → resolve schema → resolve reference lists →
//! validate → import. Every browser session opened here is closed before the call
//! returns.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::auth::{self, ConnectionResult};
use crate::chromedriver_manager::ChromeDriverManager;
use crate::config::AppConfig;
use crate::context::RunContext;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AdminPage, Credentials, ImportFormat, ImportResult, ListFieldInfo, ReferenceLists, SchemaTable,
    SpreadsheetData, ValidationReport,
};
use crate::reference::{ReferenceApiClient, ReferenceListCache, ReferenceListResolver};
use crate::scraper::{BrowserImportSurface, BrowserSession, ImportExecutor, Paginator, SchemaResolver, SessionDriver};
use crate::validation::{read_spreadsheet, validate_spreadsheet};

/// Schema and lists from an earlier run of the same format, reused to skip the browser
/// and network work when a corrected file is submitted again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prefetched {
    pub schema: SchemaTable,
    pub lists: ReferenceLists,
}

#[derive(Debug)]
pub enum WorkflowOutcome {
    /// Validation failed; nothing was submitted.
    Rejected(ValidationReport),
    Imported {
        report: ValidationReport,
        result: ImportResult,
    },
}

enum Preparation {
    Rejected(ValidationReport),
    Ready(ValidationReport, SchemaTable),
}

pub struct ImportWorkflow {
    config: AppConfig,
    chromedriver: Arc<ChromeDriverManager>,
    cache: ReferenceListCache,
}

impl ImportWorkflow {
    pub fn new(config: AppConfig) -> Self {
        let chromedriver = Arc::new(ChromeDriverManager::new(&config));
        Self {
            config,
            chromedriver,
            cache: ReferenceListCache::new(),
        }
    }

    /// Shares an existing reference-list cache, e.g. between workflows for several users.
    pub fn with_cache(mut self, cache: ReferenceListCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &ReferenceListCache {
        &self.cache
    }

    pub async fn shutdown(&self) {
        self.chromedriver.stop_driver().await;
    }

    pub async fn test_connection(&self, credentials: &Credentials) -> ConnectionResult {
        auth::test_connection(
            credentials,
            self.config.timeouts.http_request(),
            self.config.reference_api.accept_invalid_certs,
        )
        .await
    }

    async fn open_session(&self) -> EngineResult<BrowserSession> {
        self.chromedriver
            .start_driver()
            .await
            .map_err(|e| EngineError::Startup(format!("{e:#}")))?;
        BrowserSession::open(&self.config).await
    }

    async fn release(mut session: BrowserSession) {
        if let Err(e) = session.close().await {
            warn!(error = %e, "closing the browser session failed");
        }
    }

    fn paginator(&self) -> Paginator {
        Paginator::new(self.config.max_pages)
    }

    async fn reach_admin(session: &BrowserSession, ctx: &RunContext, credentials: &Credentials) -> EngineResult<AdminPage> {
        let driver = SessionDriver::new(session, ctx);
        driver.authenticate(credentials).await?;
        driver.navigate_to_administration().await
    }

    pub async fn navigate_admin(&self, credentials: &Credentials) -> EngineResult<AdminPage> {
        let ctx = RunContext::new(&credentials.site_url);
        let session = self.open_session().instrument(ctx.span().clone()).await?;

        let outcome = Self::reach_admin(&session, &ctx, credentials)
            .instrument(ctx.span().clone())
            .await;
        Self::release(session).await;
        outcome
    }

    pub async fn list_formats(&self, credentials: &Credentials) -> EngineResult<Vec<ImportFormat>> {
        let ctx = RunContext::new(&credentials.site_url);
        let session = self.open_session().instrument(ctx.span().clone()).await?;

        let outcome = async {
            Self::reach_admin(&session, &ctx, credentials).await?;
            SessionDriver::new(&session, &ctx).open_import_formats().await?;
            SchemaResolver::new(&session, &ctx, self.paginator(), &self.config.timeouts)
                .list_formats()
                .await
        }
        .instrument(ctx.span().clone())
        .await;

        Self::release(session).await;
        outcome
    }

    async fn schema_in_session(
        &self,
        session: &BrowserSession,
        ctx: &RunContext,
        credentials: &Credentials,
        format_name: &str,
    ) -> EngineResult<(AdminPage, SchemaTable)> {
        let admin = Self::reach_admin(session, ctx, credentials).await?;
        SessionDriver::new(session, ctx).open_import_formats().await?;
        let schema = SchemaResolver::new(session, ctx, self.paginator(), &self.config.timeouts)
            .select_format_and_extract_table(format_name)
            .await?;
        Ok((admin, schema))
    }

    pub async fn extract_schema(&self, credentials: &Credentials, format_name: &str) -> EngineResult<SchemaTable> {
        let ctx = RunContext::new(&credentials.site_url);
        let session = self.open_session().instrument(ctx.span().clone()).await?;

        let outcome = self
            .schema_in_session(&session, &ctx, credentials, format_name)
            .instrument(ctx.span().clone())
            .await;
        Self::release(session).await;
        outcome.map(|(_, schema)| schema)
    }

    /// REST only; no browser is involved.
    pub async fn resolve_reference_lists(
        &self,
        credentials: &Credentials,
        schema: &SchemaTable,
    ) -> EngineResult<(Vec<ListFieldInfo>, ReferenceLists)> {
        let client = ReferenceApiClient::new(
            &credentials.site_url,
            &self.config.reference_api,
            self.config.timeouts.http_request(),
        )?;
        ReferenceListResolver::new(client, self.config.timeouts.reference_fetch_total())
            .with_cache(self.cache.clone())
            .resolve(schema, &credentials.system_password)
            .await
    }

    /// Reads `file` and runs both validation passes.
    pub fn validate(&self, file: &Path, schema: &SchemaTable, lists: &ReferenceLists) -> EngineResult<ValidationReport> {
        let data = read_spreadsheet(file)?;
        validate_spreadsheet(&file_label(file), &data, schema, lists)
    }

    /// Full workflow. A rejected file is reported as [`WorkflowOutcome::Rejected`] and never
    /// reaches the import form.
    pub async fn run_import(
        &self,
        credentials: &Credentials,
        format_name: &str,
        file: &Path,
        prefetched: Option<Prefetched>,
    ) -> EngineResult<WorkflowOutcome> {
        let ctx = RunContext::new(&credentials.site_url);
        info!(run = %ctx.short_id(), format = format_name, "▶️ Import workflow started");

        self.run(&ctx, credentials, format_name, file, prefetched)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run(
        &self,
        ctx: &RunContext,
        credentials: &Credentials,
        format_name: &str,
        file: &Path,
        prefetched: Option<Prefetched>,
    ) -> EngineResult<WorkflowOutcome> {
        // A malformed file is rejected before any browser work
        let data = read_spreadsheet(file)?;

        if let Some(prefetched) = &prefetched {
            let report = validate_spreadsheet(&file_label(file), &data, &prefetched.schema, &prefetched.lists)?;
            if !report.is_valid() {
                return Ok(WorkflowOutcome::Rejected(report));
            }
        }

        let session = self.open_session().await?;
        let prepared = self
            .prepare(&session, ctx, credentials, format_name, file, &data, prefetched)
            .await;

        let (report, schema) = match prepared {
            Ok(Preparation::Ready(report, schema)) => (report, schema),
            Ok(Preparation::Rejected(report)) => {
                Self::release(session).await;
                return Ok(WorkflowOutcome::Rejected(report));
            }
            Err(e) => {
                Self::release(session).await;
                return Err(e);
            }
        };

        let surface = BrowserImportSurface::new(session, &self.config.timeouts);
        let result = ImportExecutor::from_timeouts(&self.config.timeouts)
            .execute(
                surface,
                &ImportFormat::named(format_name),
                file,
                &schema,
                report.data_rows as u64,
                &self.config.download_dir,
                ctx,
            )
            .await?;

        Ok(WorkflowOutcome::Imported { report, result })
    }

    /// Everything up to and including opening the import form, on a borrowed session.
    #[allow(clippy::too_many_arguments)]
    async fn prepare(
        &self,
        session: &BrowserSession,
        ctx: &RunContext,
        credentials: &Credentials,
        format_name: &str,
        file: &Path,
        data: &SpreadsheetData,
        prefetched: Option<Prefetched>,
    ) -> EngineResult<Preparation> {
        let (admin, schema, report) = match prefetched {
            Some(Prefetched { schema, lists }) => {
                let admin = Self::reach_admin(session, ctx, credentials).await?;
                let report = validate_spreadsheet(&file_label(file), data, &schema, &lists)?;
                (admin, schema, report)
            }
            None => {
                let (admin, schema) = self
                    .schema_in_session(session, ctx, credentials, format_name)
                    .await?;
                if schema.is_empty() {
                    return Err(EngineError::EmptySchema);
                }
                let (_, lists) = self.resolve_reference_lists(credentials, &schema).await?;
                let report = validate_spreadsheet(&file_label(file), data, &schema, &lists)?;
                (admin, schema, report)
            }
        };

        if !report.is_valid() {
            return Ok(Preparation::Rejected(report));
        }

        session.navigate(&admin.url).await?;
        SessionDriver::new(session, ctx).open_import_launcher().await?;
        Ok(Preparation::Ready(report, schema))
    }
}

fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}
