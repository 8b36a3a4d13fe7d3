use serde::Deserialize;
use std::fmt;

/// Credentials for one workflow call. Held in memory only: deserializable from a
/// request payload, never serialized back out.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "site_url")]
    pub site_url: String,
    pub login: String,
    pub password: String,
    /// System-level secret for the reference-data REST endpoint.
    #[serde(default, alias = "system_password")]
    pub system_password: String,
}

impl Credentials {
    pub fn new(
        site_url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        system_password: impl Into<String>,
    ) -> Self {
        Self {
            site_url: site_url.into(),
            login: login.into(),
            password: password.into(),
            system_password: system_password.into(),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.site_url.trim().is_empty() {
            errors.push("Site URL is required".to_string());
        }
        if self.login.trim().is_empty() {
            errors.push("Login is required".to_string());
        }
        if self.password.is_empty() {
            errors.push("Password is required".to_string());
        }

        errors
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("site_url", &self.site_url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("system_password", &"<redacted>")
            .finish()
    }
}
