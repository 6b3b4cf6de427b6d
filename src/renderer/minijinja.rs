use crate::{
    config::Settings,
    constants::placeholders,
    context::Context,
    error::Result,
    renderer::{interface::TemplateRenderer, Diagnostic, EngineKind, EngineOutput},
};
use log::warn;
use minijinja::{path_loader, Environment};
use std::path::PathBuf;

/// MiniJinja-based rendering for templates in the modern syntax.
///
/// Failures never propagate: the caller gets a fixed placeholder text and a
/// diagnostic, so one broken template does not halt a provisioning run.
pub struct MiniJinjaRenderer {
    /// Root for `{% include %}` / `{% import %}` lookups
    include_dir: Option<PathBuf>,
}

impl MiniJinjaRenderer {
    pub fn new(settings: &Settings) -> Self {
        Self { include_dir: settings.include_dir.clone() }
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        if let Some(include_dir) = &self.include_dir {
            env.set_loader(path_loader(include_dir.clone()));
        }
        env
    }

    fn render_internal(
        &self,
        template: &str,
        context: &Context,
    ) -> std::result::Result<String, minijinja::Error> {
        self.environment().render_str(template, context)
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn kind(&self) -> EngineKind {
        EngineKind::Modern
    }

    fn render(&self, source: &str, scope: &mut Context) -> Result<EngineOutput> {
        match self.render_internal(source, scope) {
            Ok(text) => Ok(EngineOutput::new(text)),
            Err(err) => {
                warn!("errors were encountered rendering the template");
                warn!("{err:#}");
                Ok(EngineOutput {
                    text: placeholders::MODERN_FAILED.to_string(),
                    diagnostics: vec![Diagnostic::ModernRenderFailed(err.to_string())],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn render(renderer: &MiniJinjaRenderer, template: &str, context: serde_json::Value) -> EngineOutput {
        let mut scope = context.as_object().cloned().unwrap_or_default();
        renderer.render(template, &mut scope).unwrap()
    }

    #[test]
    fn renders_context_values() {
        let renderer = MiniJinjaRenderer::new(&Settings::default());
        let output = render(
            &renderer,
            "{% for pkg in packages %}{{ pkg }} {% endfor %}on {{ hostname }}",
            json!({"packages": ["vim", "git"], "hostname": "node1"}),
        );
        assert_eq!(output.text, "vim git on node1");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn failures_degrade_to_placeholder() {
        let renderer = MiniJinjaRenderer::new(&Settings::default());
        let output = render(&renderer, "{{ name | no_such_filter }}", json!({"name": "x"}));
        assert_eq!(output.text, placeholders::MODERN_FAILED);
        assert!(matches!(output.diagnostics[..], [Diagnostic::ModernRenderFailed(_)]));
    }

    #[test]
    fn includes_resolve_from_include_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("partition.ks"), "part / --size={{ size }}").unwrap();
        let settings =
            Settings { include_dir: Some(dir.path().to_path_buf()), ..Settings::default() };
        let renderer = MiniJinjaRenderer::new(&settings);

        let output = render(&renderer, "{% include 'partition.ks' %}", json!({"size": 4096}));
        assert_eq!(output.text, "part / --size=4096");
    }

    #[test]
    fn includes_without_include_dir_fail_softly() {
        let renderer = MiniJinjaRenderer::new(&Settings::default());
        let output = render(&renderer, "{% include 'partition.ks' %}", json!({}));
        assert_eq!(output.text, placeholders::MODERN_FAILED);
    }
}
