//! Import Executor & Monitor.
//!
//! The executor drives an [`ImportSurface`] through
//! `LoggedIn → FormatSelected → FileAttached → RollbackModeSet → Submitted → Polling →
//! ResultRetrieved` and always closes the surface before returning.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::Timeouts;
use crate::context::RunContext;
use crate::error::{truncate_for_display, Control, EngineError, EngineResult};
use crate::models::{ArtifactHandle, ImportFormat, ImportResult, SchemaTable};
use super::browser::BrowserSession;
use super::probe::{ControlProbe, Requirement, Selector};
use super::selectors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    LoggedIn,
    FormatSelected,
    FileAttached,
    RollbackModeSet,
    Submitted,
    Polling,
    ResultRetrieved,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Evidence that the rollback execution mode was selected and verified. `submit` cannot
/// be called without one, and only this crate can create it.
#[derive(Debug)]
pub struct RollbackConfirmed {
    _private: (),
}

impl RollbackConfirmed {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// One look at the progress area of the import page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub artifact_href: Option<String>,
    pub completion_text: Option<String>,
    pub failure_text: Option<String>,
    pub percent: Option<u8>,
}

impl ProgressSnapshot {
    pub fn is_finished(&self) -> bool {
        self.artifact_href.is_some() || self.completion_text.is_some() || self.failure_text.is_some()
    }
}

/// The import page as the executor sees it.
#[async_trait]
pub trait ImportSurface: Send {
    async fn select_format(&mut self, format: &ImportFormat) -> EngineResult<()>;
    async fn attach_file(&mut self, file: &Path) -> EngineResult<()>;
    async fn set_rollback_mode(&mut self) -> EngineResult<RollbackConfirmed>;
    async fn submit(&mut self, confirmed: RollbackConfirmed) -> EngineResult<()>;
    async fn probe_progress(&mut self) -> EngineResult<ProgressSnapshot>;
    async fn download_artifact(&mut self, href: &str, dest_dir: &Path) -> EngineResult<ArtifactHandle>;
    async fn close(&mut self) -> EngineResult<()>;
}

fn rows_imported_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Separators only between groups of three digits, never across lines
        Regex::new(
            r"(?i)\b(\d{1,3}(?:[ \u{a0}\u{202f}]\d{3})+|\d+)[ \u{a0}\u{202f}]*(?:lignes?|rows?|enregistrements?|records?)\b",
        )
        .expect("rows pattern is valid")
    })
}

/// Row count stated by a completion message such as `"1 250 lignes importées"`.
pub fn parse_rows_imported(text: &str) -> Option<u64> {
    let captures = rows_imported_pattern().captures(text)?;
    let digits: String = captures[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// `import_result_<timestamp>_<uuid8>.xlsx`
pub fn artifact_file_name(at: DateTime<Local>, id: Uuid) -> String {
    format!(
        "import_result_{}_{}.xlsx",
        at.format("%Y%m%d_%H%M%S"),
        &id.simple().to_string()[..8]
    )
}

pub struct ImportExecutor {
    poll_interval: Duration,
    ceiling: Duration,
}

impl ImportExecutor {
    pub fn new(poll_interval: Duration, ceiling: Duration) -> Self {
        Self {
            poll_interval,
            ceiling,
        }
    }

    pub fn from_timeouts(timeouts: &Timeouts) -> Self {
        Self::new(timeouts.poll_interval(), timeouts.import_ceiling())
    }

    /// Runs one import. The surface is consumed and closed exactly once, whatever the
    /// outcome. `expected_rows` is reported when the target system does not state a count.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<S: ImportSurface>(
        &self,
        mut surface: S,
        format: &ImportFormat,
        file: &Path,
        schema: &SchemaTable,
        expected_rows: u64,
        dest_dir: &Path,
        ctx: &RunContext,
    ) -> EngineResult<ImportResult> {
        let outcome = self
            .drive(&mut surface, format, file, schema, expected_rows, dest_dir)
            .instrument(ctx.step("import"))
            .await;

        if let Err(e) = surface.close().await {
            warn!(error = %e, "closing the import session failed");
        }
        outcome
    }

    async fn drive<S: ImportSurface>(
        &self,
        surface: &mut S,
        format: &ImportFormat,
        file: &Path,
        schema: &SchemaTable,
        expected_rows: u64,
        dest_dir: &Path,
    ) -> EngineResult<ImportResult> {
        if schema.is_empty() {
            return Err(EngineError::EmptySchema);
        }

        let mut stage = ImportStage::LoggedIn;
        info!(format = %format.name, file = %file.display(), "📤 Starting import");

        surface.select_format(format).await?;
        advance(&mut stage, ImportStage::FormatSelected);

        surface.attach_file(file).await?;
        advance(&mut stage, ImportStage::FileAttached);

        let confirmed = surface.set_rollback_mode().await?;
        advance(&mut stage, ImportStage::RollbackModeSet);

        surface.submit(confirmed).await?;
        advance(&mut stage, ImportStage::Submitted);

        advance(&mut stage, ImportStage::Polling);
        let snapshot = self.monitor(surface).await?;

        let result = self
            .resolve(surface, snapshot, expected_rows, dest_dir)
            .await?;
        advance(&mut stage, ImportStage::ResultRetrieved);

        info!(
            rows = result.rows_imported,
            artifact = result.result_artifact_ref.is_some(),
            "✅ Import finished"
        );
        Ok(result)
    }

    async fn monitor<S: ImportSurface>(&self, surface: &mut S) -> EngineResult<ProgressSnapshot> {
        let started = Instant::now();

        loop {
            let snapshot = surface.probe_progress().await?;
            if snapshot.is_finished() {
                return Ok(snapshot);
            }

            if let Some(percent) = snapshot.percent {
                debug!(percent, "import in progress");
            }

            let elapsed = started.elapsed();
            if elapsed >= self.ceiling {
                warn!(waited = ?self.ceiling, "import did not finish before the ceiling");
                return Err(EngineError::ImportTimeout { waited: self.ceiling });
            }
            sleep(self.poll_interval.min(self.ceiling - elapsed)).await;
        }
    }

    async fn resolve<S: ImportSurface>(
        &self,
        surface: &mut S,
        snapshot: ProgressSnapshot,
        expected_rows: u64,
        dest_dir: &Path,
    ) -> EngineResult<ImportResult> {
        let rows_imported = snapshot
            .completion_text
            .as_deref()
            .and_then(parse_rows_imported)
            .unwrap_or(expected_rows);

        if let Some(href) = snapshot.artifact_href {
            let handle = surface.download_artifact(&href, dest_dir).await?;
            info!(file = %handle.file_name, "📥 Result file saved");
            return Ok(ImportResult {
                success: true,
                rows_imported,
                result_artifact_ref: Some(handle),
            });
        }

        if let Some(text) = snapshot.failure_text {
            return Err(EngineError::RemoteImportFailure(truncate_for_display(&text)));
        }

        info!("import completed without a result file");
        Ok(ImportResult {
            success: true,
            rows_imported,
            result_artifact_ref: None,
        })
    }
}

fn advance(stage: &mut ImportStage, next: ImportStage) {
    debug!(from = %stage, to = %next, "import stage");
    *stage = next;
}

const DOWNLOAD_SCRIPT: &str = r#"
const href = arguments[0];
const done = arguments[arguments.length - 1];
fetch(href, { credentials: 'include' })
    .then(r => { if (!r.ok) { throw new Error('HTTP ' + r.status); } return r.blob(); })
    .then(blob => new Promise((resolve, reject) => {
        const reader = new FileReader();
        reader.onload = () => resolve(String(reader.result).split(',')[1] || '');
        reader.onerror = () => reject(reader.error);
        reader.readAsDataURL(blob);
    }))
    .then(data => done({ ok: true, data: data }))
    .catch(e => done({ ok: false, error: String(e) }));
"#;

/// [`ImportSurface`] over a live browser session already showing the import form.
pub struct BrowserImportSurface {
    session: BrowserSession,
    combobox_settle: Duration,
}

impl BrowserImportSurface {
    pub fn new(session: BrowserSession, timeouts: &Timeouts) -> Self {
        Self {
            session,
            combobox_settle: timeouts.combobox_settle(),
        }
    }

    /// Single-shot probe; the monitor loop supplies the waiting.
    fn glance(&self) -> ControlProbe<'_> {
        ControlProbe::new(self.session.driver(), Duration::ZERO)
    }

    async fn text_of(&self, candidates: &[Selector]) -> Option<String> {
        let element = self.glance().find(candidates, Requirement::Displayed).await?;
        let text = element.text().await.ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[async_trait]
impl ImportSurface for BrowserImportSurface {
    async fn select_format(&mut self, format: &ImportFormat) -> EngineResult<()> {
        let combobox = self
            .session
            .patient_probe()
            .require(Control::FormatCombobox, selectors::FORMAT_COMBOBOXES, Requirement::Enabled)
            .await?;

        combobox.click().await?;
        self.session.send_keys(&combobox, &format.name).await?;
        sleep(self.combobox_settle).await;
        combobox.send_keys(Key::Enter).await?;
        sleep(self.combobox_settle).await;

        debug!(format = %format.name, "format selected");
        Ok(())
    }

    async fn attach_file(&mut self, file: &Path) -> EngineResult<()> {
        let absolute = std::fs::canonicalize(file)?;

        let input = match self
            .session
            .probe()
            .find(selectors::FILE_INPUTS, Requirement::Present)
            .await
        {
            Some(input) => input,
            None => {
                // Hidden behind a drop zone until it is activated
                let patient = self.session.patient_probe();
                patient.click(Control::FileInput, selectors::DROP_ZONES).await?;
                patient
                    .require(Control::FileInput, selectors::FILE_INPUTS, Requirement::Present)
                    .await?
            }
        };

        input.send_keys(absolute.to_string_lossy().into_owned()).await?;
        debug!(file = %absolute.display(), "file attached");
        Ok(())
    }

    async fn set_rollback_mode(&mut self) -> EngineResult<RollbackConfirmed> {
        let radio = self
            .session
            .patient_probe()
            .require(Control::RollbackMode, selectors::ROLLBACK_RADIOS, Requirement::Present)
            .await?;

        if !radio.is_selected().await? {
            // Styled radios are often covered by their label; click through script
            self.session
                .execute_script_and_get_value("arguments[0].click();", vec![radio.to_json()?])
                .await?;
        }

        if !radio.is_selected().await? {
            return Err(EngineError::not_found(
                Control::RollbackMode,
                selectors::ROLLBACK_RADIOS.len(),
            ));
        }

        info!("🛡️ Rollback execution mode selected");
        Ok(RollbackConfirmed::new())
    }

    async fn submit(&mut self, _confirmed: RollbackConfirmed) -> EngineResult<()> {
        let button = self
            .session
            .patient_probe()
            .require(Control::SubmitButton, selectors::SUBMIT_BUTTONS, Requirement::Enabled)
            .await?;
        button.click().await?;
        info!("🚀 Import submitted");
        Ok(())
    }

    async fn probe_progress(&mut self) -> EngineResult<ProgressSnapshot> {
        let mut snapshot = ProgressSnapshot::default();

        if let Some(link) = self
            .glance()
            .find(selectors::RESULT_ARTIFACT_LINKS, Requirement::Present)
            .await
        {
            snapshot.artifact_href = link.attr("href").await?.filter(|h| !h.trim().is_empty());
        }

        snapshot.completion_text = self.text_of(selectors::COMPLETION_MARKERS).await;
        snapshot.failure_text = self.text_of(selectors::FAILURE_MARKERS).await;

        if let Some(bar) = self
            .glance()
            .find(selectors::PROGRESS_BARS, Requirement::Present)
            .await
        {
            snapshot.percent = bar
                .attr("aria-valuenow")
                .await?
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|v| v.clamp(0.0, 100.0) as u8);
        }

        Ok(snapshot)
    }

    async fn download_artifact(&mut self, href: &str, dest_dir: &Path) -> EngineResult<ArtifactHandle> {
        let value = self
            .session
            .execute_async_and_get_value(DOWNLOAD_SCRIPT, vec![serde_json::Value::String(href.to_string())])
            .await?;

        if !value["ok"].as_bool().unwrap_or(false) {
            let reason = value["error"].as_str().unwrap_or("unknown error");
            return Err(EngineError::Artifact(truncate_for_display(reason)));
        }

        let encoded = value["data"].as_str().unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EngineError::Artifact(format!("invalid base64 payload: {e}")))?;

        std::fs::create_dir_all(dest_dir)?;
        let file_name = artifact_file_name(Local::now(), Uuid::new_v4());
        let path: PathBuf = dest_dir.join(&file_name);
        std::fs::write(&path, &bytes)?;

        debug!(bytes = bytes.len(), path = %path.display(), "artifact written");
        Ok(ArtifactHandle { file_name, path })
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockSurface {
        events: Arc<Mutex<Vec<&'static str>>>,
        closes: Arc<AtomicUsize>,
        progress: VecDeque<ProgressSnapshot>,
        fail_on: Option<&'static str>,
    }

    impl MockSurface {
        fn record(&self, event: &'static str) -> EngineResult<()> {
            self.events.lock().unwrap().push(event);
            if self.fail_on == Some(event) {
                return Err(EngineError::not_found(Control::FileInput, 1));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ImportSurface for MockSurface {
        async fn select_format(&mut self, _format: &ImportFormat) -> EngineResult<()> {
            self.record("select_format")
        }

        async fn attach_file(&mut self, _file: &Path) -> EngineResult<()> {
            self.record("attach_file")
        }

        async fn set_rollback_mode(&mut self) -> EngineResult<RollbackConfirmed> {
            self.record("set_rollback_mode")?;
            Ok(RollbackConfirmed::new())
        }

        async fn submit(&mut self, _confirmed: RollbackConfirmed) -> EngineResult<()> {
            self.record("submit")
        }

        async fn probe_progress(&mut self) -> EngineResult<ProgressSnapshot> {
            self.record("probe_progress")?;
            Ok(self.progress.pop_front().unwrap_or_default())
        }

        async fn download_artifact(&mut self, href: &str, dest_dir: &Path) -> EngineResult<ArtifactHandle> {
            self.record("download_artifact")?;
            Ok(ArtifactHandle {
                file_name: href.to_string(),
                path: dest_dir.join(href),
            })
        }

        async fn close(&mut self) -> EngineResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn schema() -> SchemaTable {
        SchemaTable::from_raw(
            vec!["Field".into(), "Key".into()],
            vec![vec!["project.name".into(), "Oui".into()]],
        )
    }

    fn format() -> ImportFormat {
        ImportFormat {
            name: "Projets".to_string(),
            href: "/admin/imports/12".to_string(),
        }
    }

    fn executor() -> ImportExecutor {
        ImportExecutor::new(Duration::from_millis(10), Duration::from_millis(60))
    }

    async fn run(surface: MockSurface, schema: &SchemaTable) -> EngineResult<ImportResult> {
        executor()
            .execute(
                surface,
                &format(),
                Path::new("projects.xlsx"),
                schema,
                7,
                Path::new("/tmp/results"),
                &RunContext::new("https://legal.example.com"),
            )
            .await
    }

    #[tokio::test]
    async fn test_never_finishing_import_times_out_and_closes_once() {
        let surface = MockSurface::default();
        let closes = Arc::clone(&surface.closes);
        let events = Arc::clone(&surface.events);

        let result = run(surface, &schema()).await;

        assert!(matches!(result, Err(EngineError::ImportTimeout { waited }) if waited == Duration::from_millis(60)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        let polls = events.lock().unwrap().iter().filter(|e| **e == "probe_progress").count();
        assert!(polls >= 2);
    }

    #[tokio::test]
    async fn test_rollback_is_set_before_submit() {
        let mut surface = MockSurface::default();
        surface.progress.push_back(ProgressSnapshot {
            completion_text: Some("Import terminé".to_string()),
            ..Default::default()
        });
        let events = Arc::clone(&surface.events);

        run(surface, &schema()).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["select_format", "attach_file", "set_rollback_mode", "submit", "probe_progress"]
        );
    }

    #[tokio::test]
    async fn test_artifact_is_downloaded_and_row_count_parsed() {
        let mut surface = MockSurface::default();
        surface.progress.push_back(ProgressSnapshot::default());
        surface.progress.push_back(ProgressSnapshot {
            artifact_href: Some("result.xlsx".to_string()),
            completion_text: Some("Import terminé : 1 250 lignes importées".to_string()),
            ..Default::default()
        });

        let result = run(surface, &schema()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.rows_imported, 1250);
        assert_eq!(result.result_artifact_ref.unwrap().file_name, "result.xlsx");
    }

    #[tokio::test]
    async fn test_failure_text_is_surfaced() {
        let mut surface = MockSurface::default();
        surface.progress.push_back(ProgressSnapshot {
            failure_text: Some("Échec : colonne 'Code' inconnue".to_string()),
            ..Default::default()
        });
        let closes = Arc::clone(&surface.closes);

        let err = run(surface, &schema()).await.unwrap_err();

        match err {
            EngineError::RemoteImportFailure(text) => assert_eq!(text, "Échec : colonne 'Code' inconnue"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_without_artifact_is_soft_success() {
        let mut surface = MockSurface::default();
        surface.progress.push_back(ProgressSnapshot {
            completion_text: Some("Import terminé".to_string()),
            ..Default::default()
        });

        let result = run(surface, &schema()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.rows_imported, 7);
        assert!(result.result_artifact_ref.is_none());
    }

    #[tokio::test]
    async fn test_failed_step_never_submits_and_still_closes() {
        let surface = MockSurface {
            fail_on: Some("attach_file"),
            ..Default::default()
        };
        let events = Arc::clone(&surface.events);
        let closes = Arc::clone(&surface.closes);

        assert!(run(surface, &schema()).await.is_err());
        assert!(!events.lock().unwrap().contains(&"submit"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_schema_is_rejected_before_touching_the_page() {
        let surface = MockSurface::default();
        let events = Arc::clone(&surface.events);
        let closes = Arc::clone(&surface.closes);

        let empty = SchemaTable::from_raw(vec!["Field".into()], Vec::new());
        assert!(matches!(run(surface, &empty).await, Err(EngineError::EmptySchema)));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_rows_imported() {
        assert_eq!(parse_rows_imported("152 lignes importées"), Some(152));
        assert_eq!(parse_rows_imported("Import completed: 3 rows"), Some(3));
        assert_eq!(parse_rows_imported("1\u{a0}024 enregistrements traités"), Some(1024));
        assert_eq!(parse_rows_imported("1 250 lignes importées"), Some(1250));
        assert_eq!(parse_rows_imported("12\u{202f}500 rows"), Some(12500));
        assert_eq!(parse_rows_imported("Import terminé"), None);
    }

    #[test]
    fn test_parse_rows_ignores_unrelated_numbers() {
        assert_eq!(parse_rows_imported("Import du 12/03/2024\n3 lignes importées"), Some(3));
        assert_eq!(parse_rows_imported("Fichier 2024 12 lignes importées"), Some(12));
        assert_eq!(parse_rows_imported("Lot 7\n1 024 enregistrements"), Some(1024));
        assert_eq!(parse_rows_imported("Fichier 2024 123 lignes"), Some(123));
    }

    #[test]
    fn test_artifact_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        assert_eq!(artifact_file_name(at, id), "import_result_20240309_140507_a1b2c3d4.xlsx");
    }
}
