use tracing::Span;
use uuid::Uuid;

/// Per-run context threaded through every component call.
///
/// Carries the correlation id used in log output; nothing here is process-global, so
/// concurrent runs stay distinguishable in the logs.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    site: String,
    span: Span,
}

impl RunContext {
    pub fn new(site: &str) -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("import_run", run_id = %run_id, site = %site);
        Self {
            run_id,
            site: site.to_string(),
            span,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// First eight hex digits of the run id, for file names and short log prefixes.
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span for one pipeline step.
    pub fn step(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "step", name)
    }
}
