use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::prelude::*;
use tracing::{debug, info, warn, Instrument};

use crate::config::Timeouts;
use crate::context::RunContext;
use crate::error::{Control, EngineError, EngineResult};
use crate::models::{ImportFormat, SchemaTable, KEY_FLAG_NO, KEY_FLAG_YES};
use super::browser::BrowserSession;
use super::pagination::{Activation, DomPagedView, FormatLinkExtractor, ItemExtractor, Paginator};
use super::probe::{ControlProbe, Requirement};
use super::selectors;

/// What was found inside one configuration-table cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellProbe {
    /// Texts of the non-boolean spans, in document order.
    pub text_spans: Vec<String>,
    /// Checked state of a boolean indicator, if the cell has one.
    pub boolean_indicator: Option<bool>,
}

impl CellProbe {
    /// Text span first, then the boolean indicator as `"Oui"`/`"Non"`, else empty.
    pub fn resolve(&self) -> String {
        if let Some(text) = self
            .text_spans
            .iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
        {
            return text.to_string();
        }

        match self.boolean_indicator {
            Some(true) => KEY_FLAG_YES.to_string(),
            Some(false) => KEY_FLAG_NO.to_string(),
            None => String::new(),
        }
    }
}

fn has_checked_class(class: &str) -> bool {
    class
        .split_whitespace()
        .any(|c| selectors::BOOLEAN_CHECKED_CLASSES.contains(&c))
}

async fn probe_cell(cell: &WebElement) -> EngineResult<CellProbe> {
    let mut probe = CellProbe::default();

    for span in cell.find_all(By::Css(selectors::CELL_TEXT_SPANS)).await? {
        probe.text_spans.push(span.text().await?);
    }

    if let Some(indicator) = cell
        .find_all(By::Css(selectors::CELL_BOOLEAN_INDICATOR))
        .await?
        .into_iter()
        .next()
    {
        let class = indicator.class_name().await?.unwrap_or_default();
        probe.boolean_indicator = Some(has_checked_class(&class));
    }

    Ok(probe)
}

/// Reads one `<tr>` of the configuration table into resolved cell strings.
pub struct SchemaRowExtractor;

#[async_trait]
impl ItemExtractor for SchemaRowExtractor {
    type Item = Vec<String>;

    async fn extract(&self, element: &WebElement) -> EngineResult<Option<Vec<String>>> {
        let mut cells = Vec::new();
        for cell in element.find_all(By::Tag("td")).await? {
            cells.push(probe_cell(&cell).await?.resolve());
        }
        Ok(Some(cells))
    }
}

pub struct SchemaResolver<'a> {
    session: &'a BrowserSession,
    ctx: &'a RunContext,
    paginator: Paginator,
    timeouts: &'a Timeouts,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(
        session: &'a BrowserSession,
        ctx: &'a RunContext,
        paginator: Paginator,
        timeouts: &'a Timeouts,
    ) -> Self {
        Self {
            session,
            ctx,
            paginator,
            timeouts,
        }
    }

    fn format_view(&self) -> DomPagedView<'a, FormatLinkExtractor> {
        DomPagedView::new(
            self.session,
            selectors::FORMAT_GRID_CONTAINERS,
            selectors::FORMAT_LINKS,
            FormatLinkExtractor,
            self.timeouts.page_settle(),
        )
    }

    /// Every format offered by the (paginated) format grid.
    pub async fn list_formats(&self) -> EngineResult<Vec<ImportFormat>> {
        let mut view = self.format_view();
        self.paginator
            .extract_all(&mut view)
            .instrument(self.ctx.step("list_formats"))
            .await
    }

    pub async fn select_format_and_extract_table(&self, format_name: &str) -> EngineResult<SchemaTable> {
        self.resolve(format_name)
            .instrument(self.ctx.step("extract_schema"))
            .await
    }

    async fn resolve(&self, format_name: &str) -> EngineResult<SchemaTable> {
        info!(format = format_name, "🔎 Looking for import format");

        let mut view = self.format_view();
        let activation = self
            .paginator
            .find_and_activate(&mut view, |format| format.name == format_name)
            .await?;

        match activation {
            Activation::Activated { item, page } => {
                info!(format = %item.name, page, "✅ Format selected");
            }
            Activation::NotFound { pages_scanned } => {
                warn!(format = format_name, pages_scanned, "format not found");
                return Err(EngineError::FormatNotFound(format_name.to_string()));
            }
        }

        self.wait_for_table().await?;
        let headers = self.read_headers().await?;

        let mut rows_view = DomPagedView::new(
            self.session,
            selectors::CONFIGURATION_TABLE,
            selectors::CONFIGURATION_ROWS,
            SchemaRowExtractor,
            self.timeouts.page_settle(),
        );
        let raw_rows = self.paginator.extract_all(&mut rows_view).await?;

        let table = SchemaTable::from_raw(headers, raw_rows);
        info!(rows = table.total_rows, columns = table.headers.len(), "✅ Configuration table extracted");
        Ok(table)
    }

    /// Waits for the configuration table, with more patience on each attempt.
    async fn wait_for_table(&self) -> EngineResult<()> {
        let attempts = self.timeouts.table_wait_attempts();
        let mut waited = Duration::ZERO;

        for (attempt, patience) in attempts.iter().enumerate() {
            let probe = ControlProbe::new(self.session.driver(), *patience);
            if probe
                .find(selectors::CONFIGURATION_TABLE, Requirement::Present)
                .await
                .is_some()
            {
                debug!(attempt = attempt + 1, "configuration table rendered");
                return Ok(());
            }
            waited += *patience;
            warn!(attempt = attempt + 1, "configuration table not rendered yet");
        }

        Err(EngineError::timeout("waiting for the format configuration table", waited))
    }

    async fn read_headers(&self) -> EngineResult<Vec<String>> {
        let cells = self
            .session
            .driver()
            .find_all(By::Css(selectors::HEADER_CELLS))
            .await?;

        if cells.is_empty() {
            return Err(EngineError::not_found(Control::ConfigurationTable, 1));
        }

        let mut headers = Vec::with_capacity(cells.len());
        for cell in cells {
            let label = match cell.find(By::Css(selectors::HEADER_LABEL_SPAN)).await {
                Ok(span) => span.text().await?,
                Err(_) => cell.text().await?,
            };
            headers.push(label.trim().to_string());
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_text_span_wins_over_indicator() {
        let probe = CellProbe {
            text_spans: spans(&["  project.name "]),
            boolean_indicator: Some(true),
        };
        assert_eq!(probe.resolve(), "project.name");
    }

    #[test]
    fn test_blank_span_falls_through_to_indicator() {
        let checked = CellProbe {
            text_spans: spans(&["   "]),
            boolean_indicator: Some(true),
        };
        let unchecked = CellProbe {
            text_spans: vec![],
            boolean_indicator: Some(false),
        };
        assert_eq!(checked.resolve(), "Oui");
        assert_eq!(unchecked.resolve(), "Non");
    }

    #[test]
    fn test_first_non_empty_span_is_used() {
        let probe = CellProbe {
            text_spans: spans(&["", "type.name='Civility'", "ignored"]),
            boolean_indicator: None,
        };
        assert_eq!(probe.resolve(), "type.name='Civility'");
    }

    #[test]
    fn test_empty_cell_resolves_to_empty_string() {
        assert_eq!(CellProbe::default().resolve(), "");
    }

    #[test]
    fn test_checked_class_detection() {
        assert!(has_checked_class("boolean-indicator checked"));
        assert!(!has_checked_class("boolean-indicator unchecked"));
        assert!(!has_checked_class(""));
    }
}
