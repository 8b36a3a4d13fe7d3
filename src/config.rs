use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub headless_mode: bool,
    pub debug_mode: bool, // Verbose engine logging when RUST_LOG is unset
    pub chromedriver_port: u16,
    pub chromedriver_path: Option<PathBuf>,
    pub download_dir: PathBuf,
    /// Hard ceiling on pages walked by the paginated extractor.
    pub max_pages: usize,
    pub timeouts: Timeouts,
    pub reference_api: ReferenceApiConfig,
}

/// Every wait the engine performs is bounded by one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub element_wait_secs: u64,
    pub probe_candidate_millis: u64,
    pub page_settle_millis: u64,
    pub combobox_settle_millis: u64,
    /// Successive patience levels when waiting for the configuration table.
    pub table_wait_attempts_secs: Vec<u64>,
    pub poll_interval_secs: u64,
    pub import_ceiling_secs: u64,
    pub reference_fetch_total_secs: u64,
    pub http_request_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceApiConfig {
    pub auth_path: String,
    /// `{listType}` is replaced with the URL-encoded list type.
    pub list_path_template: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub max_concurrent_fetches: usize,
    pub accept_invalid_certs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            headless_mode: true,
            debug_mode: false,
            chromedriver_port: 9516,
            chromedriver_path: None,
            download_dir: std::env::temp_dir().join("auto_import"),
            max_pages: 200,
            timeouts: Timeouts::default(),
            reference_api: ReferenceApiConfig::default(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_wait_secs: 10,
            probe_candidate_millis: 2_000,
            page_settle_millis: 1_500,
            combobox_settle_millis: 1_000,
            table_wait_attempts_secs: vec![5, 10, 20],
            poll_interval_secs: 5,
            import_ceiling_secs: 3_600,
            reference_fetch_total_secs: 45,
            http_request_secs: 15,
        }
    }
}

impl Default for ReferenceApiConfig {
    fn default() -> Self {
        Self {
            auth_path: "/api/v1/auth/system".to_string(),
            list_path_template: "/api/v1/lists/{listType}/items".to_string(),
            page_size: 500,
            max_pages: 20,
            max_concurrent_fetches: 4,
            accept_invalid_certs: false,
        }
    }
}

impl Timeouts {
    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn probe_candidate(&self) -> Duration {
        Duration::from_millis(self.probe_candidate_millis)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_millis)
    }

    pub fn combobox_settle(&self) -> Duration {
        Duration::from_millis(self.combobox_settle_millis)
    }

    pub fn table_wait_attempts(&self) -> Vec<Duration> {
        self.table_wait_attempts_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn import_ceiling(&self) -> Duration {
        Duration::from_secs(self.import_ceiling_secs)
    }

    pub fn reference_fetch_total(&self) -> Duration {
        Duration::from_secs(self.reference_fetch_total_secs)
    }

    pub fn http_request(&self) -> Duration {
        Duration::from_secs(self.http_request_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "autoimport", "auto-import")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(proj_dirs.config_dir().join("config.json"))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_pages == 0 {
            errors.push("max_pages must be at least 1".to_string());
        }

        if self.timeouts.table_wait_attempts_secs.is_empty() {
            errors.push("At least one table wait attempt is required".to_string());
        }

        if self.timeouts.poll_interval_secs == 0 {
            errors.push("Poll interval must be positive".to_string());
        }

        if self.timeouts.import_ceiling_secs < self.timeouts.poll_interval_secs {
            errors.push("Import ceiling must be at least one poll interval".to_string());
        }

        if !self.reference_api.list_path_template.contains("{listType}") {
            errors.push("Reference list path template must contain {listType}".to_string());
        }

        if self.reference_api.page_size == 0 || self.reference_api.max_concurrent_fetches == 0 {
            errors.push("Reference API page size and concurrency must be positive".to_string());
        }

        errors
    }
}
