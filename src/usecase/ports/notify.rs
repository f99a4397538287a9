use tracing::error;

use crate::domain::entities::dataset::PageQuery;
use crate::domain::entities::edit::DirtyChange;
use crate::error::ServiceError;

/// Receives each change once its batch has been saved.
///
/// Failures are logged and otherwise ignored; they never undo a save.
pub trait ChangeListener {
    fn on_change(&self, change: &DirtyChange) -> anyhow::Result<()>;
}

impl<F> ChangeListener for F
where
    F: Fn(&DirtyChange) -> anyhow::Result<()>,
{
    fn on_change(&self, change: &DirtyChange) -> anyhow::Result<()> {
        self(change)
    }
}

/// What the engine was doing when a data service call failed.
#[derive(Debug, Clone, Copy)]
pub enum FailureContext<'a> {
    Save { changes: &'a [DirtyChange] },
    Load { query: PageQuery },
}

impl FailureContext<'_> {
    pub fn operation(&self) -> &'static str {
        match self {
            FailureContext::Save { .. } => "save_batch",
            FailureContext::Load { .. } => "fetch_page",
        }
    }
}

pub trait ErrorReporter {
    fn report(&self, context: FailureContext<'_>, error: &ServiceError);
}

/// Logs failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: FailureContext<'_>, err: &ServiceError) {
        match context {
            FailureContext::Save { changes } => {
                let keys: Vec<String> = changes
                    .iter()
                    .map(|change| change.cell_key().to_string())
                    .collect();
                error!(
                    operation = context.operation(),
                    change_count = changes.len(),
                    ?keys,
                    error = %err,
                    "failed to save changes"
                );
            }
            FailureContext::Load { query } => {
                error!(
                    operation = context.operation(),
                    page = query.page,
                    page_size = query.page_size,
                    error = %err,
                    "failed to load page"
                );
            }
        }
    }
}
