//! Generic walk over a paginated list in the target UI.

use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::ImportFormat;
use super::browser::BrowserSession;
use super::probe::{Requirement, Selector};
use super::selectors;

/// A list view that shows one page of items at a time.
#[async_trait]
pub trait PagedView: Send {
    type Item: Send;

    /// Waits until the current page's item container is rendered.
    async fn wait_ready(&mut self) -> EngineResult<()>;

    async fn read_page(&mut self) -> EngineResult<Vec<Self::Item>>;

    /// Activates (clicks) item `index` of the page last returned by `read_page`.
    async fn activate(&mut self, index: usize) -> EngineResult<()>;

    /// True when a "next" control is present and not disabled.
    async fn has_next_page(&mut self) -> EngineResult<bool>;

    /// Activates the "next" control and waits for the page to settle.
    async fn advance(&mut self) -> EngineResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation<T> {
    Activated { item: T, page: usize },
    NotFound { pages_scanned: usize },
}

/// Drives a [`PagedView`] forward with a hard page ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    max_pages: usize,
}

impl Paginator {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    /// Reads every page and returns all items in page order.
    pub async fn extract_all<V: PagedView>(&self, view: &mut V) -> EngineResult<Vec<V::Item>> {
        let mut accumulated = Vec::new();
        let mut page = 1;

        loop {
            view.wait_ready().await?;
            let items = view.read_page().await?;
            debug!(page, count = items.len(), "page extracted");
            accumulated.extend(items);

            if !view.has_next_page().await? {
                break;
            }
            if page >= self.max_pages {
                warn!(limit = self.max_pages, "next page still offered at the page ceiling");
                return Err(EngineError::PageLimitExceeded {
                    limit: self.max_pages,
                });
            }

            view.advance().await?;
            page += 1;
        }

        info!(pages = page, items = accumulated.len(), "pagination finished");
        Ok(accumulated)
    }

    /// Scans pages until `predicate` matches, activates that item and stops.
    /// The first match wins; later pages are never read.
    pub async fn find_and_activate<V, P>(&self, view: &mut V, predicate: P) -> EngineResult<Activation<V::Item>>
    where
        V: PagedView,
        P: Fn(&V::Item) -> bool + Send,
    {
        let mut page = 1;

        loop {
            view.wait_ready().await?;
            let mut items = view.read_page().await?;

            if let Some(index) = items.iter().position(|item| predicate(item)) {
                view.activate(index).await?;
                let item = items.swap_remove(index);
                debug!(page, index, "matching item activated");
                return Ok(Activation::Activated { item, page });
            }

            if !view.has_next_page().await? {
                return Ok(Activation::NotFound {
                    pages_scanned: page,
                });
            }
            if page >= self.max_pages {
                warn!(limit = self.max_pages, "next page still offered at the page ceiling");
                return Err(EngineError::PageLimitExceeded {
                    limit: self.max_pages,
                });
            }

            view.advance().await?;
            page += 1;
        }
    }
}

/// Turns one DOM element of a page into an item. `None` skips the element.
#[async_trait]
pub trait ItemExtractor: Send + Sync {
    type Item: Send;

    async fn extract(&self, element: &WebElement) -> EngineResult<Option<Self::Item>>;
}

/// [`PagedView`] over the live DOM of a browser session.
pub struct DomPagedView<'a, E> {
    session: &'a BrowserSession,
    container: &'static [Selector],
    item_selector: &'static str,
    extractor: E,
    settle: Duration,
    elements: Vec<WebElement>,
    next_control: Option<WebElement>,
}

impl<'a, E: ItemExtractor> DomPagedView<'a, E> {
    pub fn new(
        session: &'a BrowserSession,
        container: &'static [Selector],
        item_selector: &'static str,
        extractor: E,
        settle: Duration,
    ) -> Self {
        Self {
            session,
            container,
            item_selector,
            extractor,
            settle,
            elements: Vec::new(),
            next_control: None,
        }
    }
}

/// The element behind an item index returned by the last `read_page`.
fn item_at<T>(elements: &[T], index: usize) -> EngineResult<&T> {
    elements.get(index).ok_or(EngineError::ItemVanished { index })
}

async fn is_disabled(element: &WebElement) -> bool {
    if !element.is_enabled().await.unwrap_or(false) {
        return true;
    }
    if let Ok(Some(aria)) = element.attr("aria-disabled").await {
        if aria == "true" {
            return true;
        }
    }
    if let Ok(Some(class)) = element.class_name().await {
        if class.split_whitespace().any(|c| c == "disabled") {
            return true;
        }
    }
    false
}

#[async_trait]
impl<'a, E: ItemExtractor> PagedView for DomPagedView<'a, E> {
    type Item = E::Item;

    async fn wait_ready(&mut self) -> EngineResult<()> {
        let patient = self.session.patient_probe();
        if patient.find(self.container, Requirement::Present).await.is_none() {
            return Err(EngineError::timeout(
                format!("waiting for list container ({})", self.item_selector),
                self.session.element_wait(),
            ));
        }
        Ok(())
    }

    async fn read_page(&mut self) -> EngineResult<Vec<Self::Item>> {
        let found = self.session.driver().find_all(By::Css(self.item_selector)).await?;

        self.elements.clear();
        let mut items = Vec::with_capacity(found.len());
        for element in found {
            if let Some(item) = self.extractor.extract(&element).await? {
                items.push(item);
                self.elements.push(element);
            }
        }
        Ok(items)
    }

    async fn activate(&mut self, index: usize) -> EngineResult<()> {
        let element = item_at(&self.elements, index)?;

        element.scroll_into_view().await?;
        element.click().await?;
        sleep(self.settle).await;
        Ok(())
    }

    async fn has_next_page(&mut self) -> EngineResult<bool> {
        self.next_control = None;

        let next = self
            .session
            .probe()
            .find(selectors::NEXT_PAGE_CONTROLS, Requirement::Displayed)
            .await;

        if let Some(control) = next {
            if !is_disabled(&control).await {
                self.next_control = Some(control);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn advance(&mut self) -> EngineResult<()> {
        if let Some(control) = self.next_control.take() {
            control.click().await?;
            sleep(self.settle).await;
        }
        Ok(())
    }
}

/// Reads a format link: its text is the format name.
pub struct FormatLinkExtractor;

#[async_trait]
impl ItemExtractor for FormatLinkExtractor {
    type Item = ImportFormat;

    async fn extract(&self, element: &WebElement) -> EngineResult<Option<ImportFormat>> {
        let name = element.text().await?.trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        let href = element.attr("href").await?.unwrap_or_default();
        Ok(Some(ImportFormat { name, href }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Read(usize),
        Activate(usize, usize),
        Advance(usize),
    }

    /// In-memory pages; records every interaction.
    pub struct SyntheticPages {
        pages: Vec<Vec<&'static str>>,
        current: usize,
        pub events: Vec<Event>,
        /// Keeps offering a next page after the last one, like a broken control.
        pub never_disable_next: bool,
    }

    impl SyntheticPages {
        pub fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                current: 0,
                events: Vec::new(),
                never_disable_next: false,
            }
        }
    }

    #[async_trait]
    impl PagedView for SyntheticPages {
        type Item = String;

        async fn wait_ready(&mut self) -> EngineResult<()> {
            Ok(())
        }

        async fn read_page(&mut self) -> EngineResult<Vec<String>> {
            self.events.push(Event::Read(self.current + 1));
            let page = self.pages.get(self.current).cloned().unwrap_or_default();
            Ok(page.into_iter().map(String::from).collect())
        }

        async fn activate(&mut self, index: usize) -> EngineResult<()> {
            self.events.push(Event::Activate(self.current + 1, index));
            Ok(())
        }

        async fn has_next_page(&mut self) -> EngineResult<bool> {
            Ok(self.never_disable_next || self.current + 1 < self.pages.len())
        }

        async fn advance(&mut self) -> EngineResult<()> {
            self.current += 1;
            self.events.push(Event::Advance(self.current + 1));
            Ok(())
        }
    }

    fn three_pages() -> SyntheticPages {
        SyntheticPages::new(vec![
            vec!["Personne physique", "Société"],
            vec!["Contrat", "Projet"],
            vec!["Dossier", "Projet"],
        ])
    }

    #[tokio::test]
    async fn test_find_and_activate_stops_on_matching_page() {
        let mut view = three_pages();

        let outcome = Paginator::new(10)
            .find_and_activate(&mut view, |name| name == "Projet")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Activation::Activated {
                item: "Projet".to_string(),
                page: 2
            }
        );
        assert_eq!(
            view.events,
            vec![Event::Read(1), Event::Advance(2), Event::Read(2), Event::Activate(2, 1)]
        );
        assert!(!view.events.contains(&Event::Read(3)));
    }

    #[tokio::test]
    async fn test_find_and_activate_requires_exact_match() {
        let mut view = three_pages();

        let outcome = Paginator::new(10)
            .find_and_activate(&mut view, |name| name == "Proj")
            .await
            .unwrap();

        assert_eq!(outcome, Activation::NotFound { pages_scanned: 3 });
    }

    #[tokio::test]
    async fn test_extract_all_accumulates_in_page_order() {
        let mut view = three_pages();

        let items = Paginator::new(10).extract_all(&mut view).await.unwrap();

        assert_eq!(
            items,
            vec!["Personne physique", "Société", "Contrat", "Projet", "Dossier", "Projet"]
        );
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_a_next_control_that_never_disables() {
        let mut view = three_pages();
        view.never_disable_next = true;

        let err = Paginator::new(5).extract_all(&mut view).await.unwrap_err();

        assert!(matches!(err, EngineError::PageLimitExceeded { limit: 5 }));
        let reads = view.events.iter().filter(|e| matches!(e, Event::Read(_))).count();
        assert_eq!(reads, 5);
    }

    #[test]
    fn test_activating_an_index_past_the_page_is_reported() {
        let elements = ["Projet", "Dossier"];
        assert_eq!(*item_at(&elements, 1).unwrap(), "Dossier");
        assert!(matches!(item_at(&elements, 2), Err(EngineError::ItemVanished { index: 2 })));
    }
}
