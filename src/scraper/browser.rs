use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};
use super::probe::{self, ControlProbe, Requirement};

const CONNECT_ATTEMPTS: u32 = 3;

/// One exclusively-owned browser session. `close` quits it exactly once; dropping an
/// unclosed session schedules a best-effort quit so a cancelled run does not leak Chrome.
pub struct BrowserSession {
    driver: WebDriver,
    per_candidate: Duration,
    element_wait: Duration,
    closed: bool,
}

impl BrowserSession {
    pub async fn open(config: &AppConfig) -> EngineResult<Self> {
        debug!(headless = config.headless_mode, "opening browser session");

        let mut caps = DesiredCapabilities::chrome();

        let mut chrome_args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1920,1080".to_string(),
        ];

        if config.headless_mode {
            chrome_args.push("--headless=new".to_string());
        }

        for arg in &chrome_args {
            caps.add_arg(arg)?;
        }

        let server_url = format!("http://localhost:{}", config.chromedriver_port);
        let mut last_error = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            match WebDriver::new(&server_url, caps.clone()).await {
                Ok(driver) => {
                    info!("🌐 Browser session opened");
                    return Ok(Self::from_driver(driver, config));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "ChromeDriver connection attempt failed");
                    last_error = Some(e);
                    if attempt < CONNECT_ATTEMPTS {
                        sleep(Duration::from_millis(1000)).await;
                    }
                }
            }
        }

        Err(EngineError::Startup(format!(
            "could not connect to ChromeDriver on port {} after {} attempts: {}",
            config.chromedriver_port,
            CONNECT_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn from_driver(driver: WebDriver, config: &AppConfig) -> Self {
        Self {
            driver,
            per_candidate: config.timeouts.probe_candidate(),
            element_wait: config.timeouts.element_wait(),
            closed: false,
        }
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub fn probe(&self) -> ControlProbe<'_> {
        ControlProbe::new(&self.driver, self.per_candidate)
    }

    /// Probe with the longer element-wait timeout, for controls that appear after a
    /// navigation rather than ones that should already be on screen.
    pub fn patient_probe(&self) -> ControlProbe<'_> {
        ControlProbe::new(&self.driver, self.element_wait)
    }

    pub fn element_wait(&self) -> Duration {
        self.element_wait
    }

    pub async fn navigate(&self, url: &str) -> EngineResult<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> EngineResult<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    pub async fn wait_for(&self, by: By, timeout: Duration, requirement: Requirement) -> Option<WebElement> {
        probe::wait_for(&self.driver, by, timeout, requirement).await
    }

    pub async fn send_keys(&self, element: &WebElement, text: &str) -> EngineResult<()> {
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    pub async fn execute_script_and_get_value(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> EngineResult<serde_json::Value> {
        let ret = self.driver.execute(script, args).await?;
        Ok(ret.json().clone())
    }

    pub async fn execute_async_and_get_value(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> EngineResult<serde_json::Value> {
        let ret = self.driver.execute_async(script, args).await?;
        Ok(ret.json().clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn close(&mut self) -> EngineResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let driver = self.driver.clone();
        driver.quit().await?;
        debug!("browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        // Best effort cleanup for cancelled runs
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let driver = self.driver.clone();
            handle.spawn(async move {
                let _ = driver.quit().await;
            });
        }
    }
}
