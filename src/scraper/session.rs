use tracing::{info, warn, Instrument};

use crate::context::RunContext;
use crate::error::{truncate_for_display, Control, EngineError, EngineResult};
use crate::models::{AdminPage, Credentials};
use super::browser::BrowserSession;
use super::probe::Requirement;
use super::selectors;

/// Proof that the session passed the login step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A post-login marker was already present; the form was skipped.
    AlreadyAuthenticated,
    LoggedIn,
}

/// Authentication and navigation to the administration area.
pub struct SessionDriver<'a> {
    session: &'a BrowserSession,
    ctx: &'a RunContext,
}

impl<'a> SessionDriver<'a> {
    pub fn new(session: &'a BrowserSession, ctx: &'a RunContext) -> Self {
        Self { session, ctx }
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> EngineResult<AuthOutcome> {
        self.login(credentials)
            .instrument(self.ctx.step("authenticate"))
            .await
    }

    async fn login(&self, credentials: &Credentials) -> EngineResult<AuthOutcome> {
        info!("🔐 Opening login page");

        self.session.navigate(&credentials.site_url).await?;

        // Re-entry on an authenticated session skips the form entirely
        if self.session.probe().is_present(selectors::POST_LOGIN_MARKERS).await {
            info!("Session already authenticated, skipping login form");
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        let patient = self.session.patient_probe();
        let username = patient
            .require(Control::LoginForm, selectors::USERNAME_INPUTS, Requirement::Displayed)
            .await?;
        let password = self
            .session
            .probe()
            .require(Control::LoginForm, selectors::PASSWORD_INPUTS, Requirement::Displayed)
            .await?;

        self.session.send_keys(&username, &credentials.login).await?;
        self.session.send_keys(&password, &credentials.password).await?;

        self.session
            .probe()
            .click(Control::LoginButton, selectors::LOGIN_BUTTONS)
            .await?;

        if patient.is_present(selectors::POST_LOGIN_MARKERS).await {
            info!("✅ Logged in");
            return Ok(AuthOutcome::LoggedIn);
        }

        let message = self.login_error_text().await;
        warn!(message = %message, "login did not reach the post-login page");
        Err(EngineError::Auth(message))
    }

    async fn login_error_text(&self) -> String {
        if let Some(element) = self
            .session
            .probe()
            .find(selectors::LOGIN_ERROR_MESSAGES, Requirement::Displayed)
            .await
        {
            if let Ok(text) = element.text().await {
                if !text.trim().is_empty() {
                    return truncate_for_display(&text);
                }
            }
        }
        "post-login page was not reached; check login and password".to_string()
    }

    pub async fn navigate_to_administration(&self) -> EngineResult<AdminPage> {
        self.open_administration()
            .instrument(self.ctx.step("navigate_admin"))
            .await
    }

    async fn open_administration(&self) -> EngineResult<AdminPage> {
        info!("📍 Opening administration area");

        let patient = self.session.patient_probe();
        patient.click(Control::AdminMenu, selectors::USER_MENUS).await?;
        patient.click(Control::AdminEntry, selectors::ADMIN_ENTRIES).await?;

        if !patient.is_present(selectors::ADMIN_PAGE_MARKERS).await {
            return Err(EngineError::timeout(
                "waiting for the administration page",
                self.session.element_wait(),
            ));
        }

        let url = self.session.current_url().await?;
        info!(url = %url, "✅ Administration area reached");
        Ok(AdminPage { url })
    }

    /// From the administration area, opens the list of import formats.
    pub async fn open_import_formats(&self) -> EngineResult<()> {
        let patient = self.session.patient_probe();
        patient
            .click(Control::ImportSection, selectors::IMPORT_SECTION_LINKS)
            .await?;

        patient
            .require(Control::FormatGrid, selectors::FORMAT_GRID_CONTAINERS, Requirement::Present)
            .await?;
        Ok(())
    }

    /// From the import section, opens the form used to launch a new import.
    pub async fn open_import_launcher(&self) -> EngineResult<()> {
        self.open_import_formats().await?;

        let patient = self.session.patient_probe();
        patient
            .click(Control::ImportSection, selectors::IMPORT_LAUNCH_LINKS)
            .await?;
        patient
            .require(Control::FormatCombobox, selectors::FORMAT_COMBOBOXES, Requirement::Displayed)
            .await?;
        info!("📤 Import form opened");
        Ok(())
    }
}
