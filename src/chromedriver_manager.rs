use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

const LATEST_RELEASE_URL: &str = "https://googlechromelabs.github.io/chrome-for-testing/LATEST_RELEASE_STABLE";
const DOWNLOAD_BASE_URL: &str = "https://storage.googleapis.com/chrome-for-testing-public";
const READINESS_TIMEOUT: Duration = Duration::from_secs(15);

/// Chrome-for-Testing platform name and binary name for the running OS.
fn platform() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("win64", "chromedriver.exe")
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            ("mac-arm64", "chromedriver")
        } else {
            ("mac-x64", "chromedriver")
        }
    } else {
        ("linux64", "chromedriver")
    }
}

pub fn download_url(version: &str) -> String {
    let (platform, _) = platform();
    format!("{DOWNLOAD_BASE_URL}/{version}/{platform}/chromedriver-{platform}.zip")
}

/// Owns the chromedriver subprocess shared by every run of the process. Each run still
/// opens its own browser session against it.
pub struct ChromeDriverManager {
    driver_path: PathBuf,
    port: u16,
    process: Arc<Mutex<Option<Child>>>,
}

impl ChromeDriverManager {
    pub fn new(config: &AppConfig) -> Self {
        let driver_path = config.chromedriver_path.clone().unwrap_or_else(|| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."));
            exe_dir.join(platform().1)
        });

        Self {
            driver_path,
            port: config.chromedriver_port,
            process: Arc::new(Mutex::new(None)),
        }
    }

    pub fn driver_path(&self) -> &Path {
        &self.driver_path
    }

    pub async fn ensure_driver_available(&self) -> Result<()> {
        if self.driver_path.exists() {
            debug!(path = %self.driver_path.display(), "ChromeDriver found");
            return Ok(());
        }

        info!(path = %self.driver_path.display(), "ChromeDriver not found, downloading");
        self.download_chromedriver()
            .await
            .context("Failed to download ChromeDriver. Please check your internet connection.")
    }

    /// Starts chromedriver unless it is already running, then waits for `/status`.
    pub async fn start_driver(&self) -> Result<()> {
        self.ensure_driver_available().await?;

        let mut process_guard = self.process.lock().await;
        if let Some(child) = process_guard.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!(port = self.port, "ChromeDriver already running");
                return Ok(());
            }
            warn!("ChromeDriver process exited, restarting");
            *process_guard = None;
        }

        info!(port = self.port, "Starting ChromeDriver");
        let child = Command::new(&self.driver_path)
            .arg(format!("--port={}", self.port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start ChromeDriver from {:?}. Make sure Chrome is installed.",
                    self.driver_path
                )
            })?;
        *process_guard = Some(child);

        if !self.wait_for_readiness().await {
            return Err(anyhow::anyhow!(
                "ChromeDriver failed to become ready within {} seconds",
                READINESS_TIMEOUT.as_secs()
            ));
        }

        info!(port = self.port, "✅ ChromeDriver ready");
        Ok(())
    }

    pub async fn stop_driver(&self) {
        let mut process_guard = self.process.lock().await;
        if let Some(mut child) = process_guard.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("ChromeDriver stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        let mut process_guard = self.process.lock().await;
        process_guard
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
            .unwrap_or(false)
    }

    async fn download_chromedriver(&self) -> Result<()> {
        let version = reqwest::get(LATEST_RELEASE_URL)
            .await?
            .error_for_status()?
            .text()
            .await?
            .trim()
            .to_string();
        let url = download_url(&version);
        info!(version = %version, "Downloading ChromeDriver");

        let zip_data = reqwest::get(&url).await?.error_for_status()?.bytes().await?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;

        let binary_name = platform().1;
        let mut extracted = false;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            // Archives nest the binary under `chromedriver-<platform>/`
            if name.ends_with(binary_name) && !name.ends_with('/') {
                if let Some(parent) = self.driver_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = fs::File::create(&self.driver_path)?;
                std::io::copy(&mut entry, &mut outfile)?;
                extracted = true;
                debug!(entry = %name, "ChromeDriver extracted");
                break;
            }
        }

        if !extracted {
            return Err(anyhow::anyhow!("{binary_name} not found in {url}"));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.driver_path, fs::Permissions::from_mode(0o755))?;
        }

        info!(path = %self.driver_path.display(), "ChromeDriver downloaded");
        Ok(())
    }

    async fn wait_for_readiness(&self) -> bool {
        let client = reqwest::Client::new();
        let url = format!("http://localhost:{}/status", self.port);
        let start = tokio::time::Instant::now();

        while start.elapsed() < READINESS_TIMEOUT {
            if let Ok(response) = client.get(&url).send().await {
                if response.status().is_success() {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        false
    }
}

impl Drop for ChromeDriverManager {
    fn drop(&mut self) {
        // Best effort cleanup
        if let Ok(mut process_guard) = self.process.try_lock() {
            if let Some(mut child) = process_guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_matches_platform() {
        let url = download_url("131.0.6778.85");
        let (platform, _) = platform();
        assert!(url.starts_with("https://storage.googleapis.com/chrome-for-testing-public/131.0.6778.85/"));
        assert!(url.ends_with(&format!("{platform}/chromedriver-{platform}.zip")));
    }

    #[test]
    fn test_configured_path_wins() {
        let config = AppConfig {
            chromedriver_path: Some(PathBuf::from("/opt/drivers/chromedriver")),
            chromedriver_port: 9600,
            ..AppConfig::default()
        };
        let manager = ChromeDriverManager::new(&config);
        assert_eq!(manager.driver_path(), Path::new("/opt/drivers/chromedriver"));
    }

    #[tokio::test]
    async fn test_not_running_before_start() {
        let manager = ChromeDriverManager::new(&AppConfig::default());
        assert!(!manager.is_running().await);
    }
}
