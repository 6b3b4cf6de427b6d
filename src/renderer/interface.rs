use super::{EngineKind, EngineOutput};
use crate::context::Context;
use crate::error::Result;

/// Trait for template rendering engines.
pub trait TemplateRenderer: Send + Sync {
    /// Which engine this is, for logging and for the render result.
    fn kind(&self) -> EngineKind;

    /// Renders template source against a working scope.
    ///
    /// # Arguments
    /// * `source` - Template source with any engine directive line removed
    /// * `scope` - Per-call copy of the caller's context; engines may add keys
    ///
    /// # Returns
    /// * `Result<EngineOutput>` - Rendered text plus advisory diagnostics
    fn render(&self, source: &str, scope: &mut Context) -> Result<EngineOutput>;
}
