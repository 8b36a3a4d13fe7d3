//! Capability probe: one routine for locating any control from an ordered list of
//! selector candidates, each tried with its own short timeout.

use std::future::Future;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Control, EngineError, EngineResult};

const POLL_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    XPath,
}

/// A matcher specification for one way of finding a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub label: &'static str,
    pub kind: SelectorKind,
    pub value: &'static str,
}

impl Selector {
    pub const fn css(label: &'static str, value: &'static str) -> Self {
        Self {
            label,
            kind: SelectorKind::Css,
            value,
        }
    }

    pub const fn xpath(label: &'static str, value: &'static str) -> Self {
        Self {
            label,
            kind: SelectorKind::XPath,
            value,
        }
    }

    pub fn to_by(&self) -> By {
        match self.kind {
            SelectorKind::Css => By::Css(self.value),
            SelectorKind::XPath => By::XPath(self.value),
        }
    }
}

/// What a located element must satisfy to count as resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Present,
    Displayed,
    Enabled,
}

impl Requirement {
    pub async fn satisfied_by(&self, element: &WebElement) -> bool {
        match self {
            Self::Present => true,
            Self::Displayed => element.is_displayed().await.unwrap_or(false),
            Self::Enabled => {
                element.is_displayed().await.unwrap_or(false)
                    && element.is_enabled().await.unwrap_or(false)
            }
        }
    }
}

/// Tries `candidates` in order and returns the first value `attempt` resolves, together
/// with the candidate that produced it. Later candidates are never attempted.
pub async fn first_resolving<T, F, Fut>(candidates: &[Selector], mut attempt: F) -> Option<(T, Selector)>
where
    F: FnMut(Selector) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for candidate in candidates {
        if let Some(found) = attempt(*candidate).await {
            return Some((found, *candidate));
        }
        debug!(candidate = candidate.label, "selector candidate did not resolve");
    }
    None
}

/// Polls for an element matching `by` until `timeout`. Never waits unbounded.
pub async fn wait_for(
    driver: &WebDriver,
    by: By,
    timeout: Duration,
    requirement: Requirement,
) -> Option<WebElement> {
    let start = Instant::now();

    loop {
        if let Ok(elements) = driver.find_all(by.clone()).await {
            for element in elements {
                if requirement.satisfied_by(&element).await {
                    return Some(element);
                }
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }

        sleep(POLL_STEP).await;
    }
}

/// Probe bound to one browser with a fixed per-candidate timeout.
pub struct ControlProbe<'a> {
    driver: &'a WebDriver,
    per_candidate: Duration,
}

impl<'a> ControlProbe<'a> {
    pub fn new(driver: &'a WebDriver, per_candidate: Duration) -> Self {
        Self {
            driver,
            per_candidate,
        }
    }

    pub async fn find(&self, candidates: &[Selector], requirement: Requirement) -> Option<WebElement> {
        let found = first_resolving(candidates, |candidate| async move {
            wait_for(self.driver, candidate.to_by(), self.per_candidate, requirement).await
        })
        .await;

        found.map(|(element, candidate)| {
            debug!(candidate = candidate.label, "control resolved");
            element
        })
    }

    /// Like [`find`](Self::find) but exhaustion becomes `ControlNotFound`.
    pub async fn require(
        &self,
        control: Control,
        candidates: &[Selector],
        requirement: Requirement,
    ) -> EngineResult<WebElement> {
        self.find(candidates, requirement)
            .await
            .ok_or_else(|| EngineError::not_found(control, candidates.len()))
    }

    pub async fn click(&self, control: Control, candidates: &[Selector]) -> EngineResult<WebElement> {
        let element = self.require(control, candidates, Requirement::Enabled).await?;
        element.click().await?;
        Ok(element)
    }

    /// Quick presence check with the probe's per-candidate timeout.
    pub async fn is_present(&self, candidates: &[Selector]) -> bool {
        self.find(candidates, Requirement::Displayed).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const CANDIDATES: &[Selector] = &[
        Selector::css("first", "#a"),
        Selector::css("second", "#b"),
        Selector::xpath("third", "//c"),
    ];

    #[tokio::test]
    async fn test_first_resolving_stops_at_first_match() {
        let attempted = Mutex::new(Vec::new());

        let found = first_resolving(CANDIDATES, |candidate| {
            attempted.lock().unwrap().push(candidate.label);
            async move { (candidate.label == "second").then_some(42) }
        })
        .await;

        let (value, candidate) = found.unwrap();
        assert_eq!(value, 42);
        assert_eq!(candidate.label, "second");
        assert_eq!(*attempted.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_first_resolving_exhausts_all_candidates() {
        let attempts = Mutex::new(0);

        let found: Option<(u8, Selector)> = first_resolving(CANDIDATES, |_| {
            *attempts.lock().unwrap() += 1;
            async { None }
        })
        .await;

        assert!(found.is_none());
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[test]
    fn test_selector_kinds() {
        assert_eq!(CANDIDATES[0].kind, SelectorKind::Css);
        assert_eq!(CANDIDATES[2].kind, SelectorKind::XPath);
    }
}
