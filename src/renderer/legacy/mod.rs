//! The legacy template language: `$placeholders`, `#directives`, a shared
//! macro library and snippet inclusion.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod preprocess;
pub mod snippets;

pub use self::macros::{MacroCache, MacroLibrary};
pub use self::snippets::SnippetLoader;

use self::eval::{execute, Env};
use crate::{
    config::Settings,
    constants::keys,
    context::Context,
    error::{Error, Result},
    renderer::{interface::TemplateRenderer, EngineKind, EngineOutput},
    security::{self, SecurityPolicy},
};
use log::{error, warn};
use serde_json::Value;
use std::path::PathBuf;

/// Renders templates in the legacy language.
pub struct LegacyRenderer {
    policy: Option<SecurityPolicy>,
    macros_file: PathBuf,
    macro_cache: MacroCache,
    snippets: SnippetLoader,
    /// Decided at construction; templates cannot probe for it.
    supports_snippets: bool,
}

impl LegacyRenderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            policy: SecurityPolicy::from_settings(settings),
            macros_file: settings.legacy_macros_file.clone(),
            macro_cache: MacroCache::new(),
            snippets: SnippetLoader::new(&settings.snippets_dir),
            supports_snippets: settings.snippet_inclusion,
        }
    }

    pub fn supports_snippets(&self) -> bool {
        self.supports_snippets
    }

    /// Import check followed by the source rewrites, in order.
    pub fn preprocess(&self, source: &str, scope: &Context) -> Result<String> {
        security::enforce(self.policy.as_ref(), source)?;
        let source = preprocess::substitute_alias(source);
        let source = preprocess::rewrite_network_tree(&source, scope)?;
        Ok(preprocess::inject_error_catcher(&source))
    }
}

impl TemplateRenderer for LegacyRenderer {
    fn kind(&self) -> EngineKind {
        EngineKind::Legacy
    }

    fn render(&self, source: &str, scope: &mut Context) -> Result<EngineOutput> {
        let source = self.preprocess(source, scope)?;

        let universe = scope.clone();
        scope.insert(keys::TEMPLATE_UNIVERSE.to_string(), Value::Object(universe));

        let library = self.macro_cache.load(&self.macros_file)?;

        let template = parser::parse_template(&source).map_err(|err| {
            error!("Failed to compile legacy template: {err}");
            Error::RenderExecutionError(err.to_string())
        })?;
        let env = Env {
            scope,
            library: &library,
            snippets: self.supports_snippets.then_some(&self.snippets),
        };
        let (text, diagnostics) = execute(&template, &env).map_err(|err| {
            error!("Failed to render legacy template: {err}");
            Error::RenderExecutionError(err.to_string())
        })?;

        if !diagnostics.is_empty() {
            warn!("errors were encountered rendering the template");
            for diagnostic in &diagnostics {
                warn!("{diagnostic}");
            }
        }

        Ok(EngineOutput { text, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Diagnostic;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        settings: Settings,
    }

    fn fixture(macros: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let macros_file = dir.path().join("macros");
        std::fs::write(&macros_file, macros).unwrap();
        let snippets_dir = dir.path().join("snippets");
        std::fs::create_dir_all(&snippets_dir).unwrap();
        let settings = Settings {
            legacy_macros_file: macros_file,
            snippets_dir,
            ..Settings::default()
        };
        Fixture { _dir: dir, settings }
    }

    fn scope(value: serde_json::Value) -> Context {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn renders_with_alias_and_library() {
        let fx = fixture("#def greeting($who)\nhello $who#slurp\n#end def\n");
        let renderer = LegacyRenderer::new(&fx.settings);
        let mut scope = scope(json!({"name": "web01"}));

        let output = renderer.render("$greeting(TEMPLATE::name)\n", &mut scope).unwrap();
        assert_eq!(output.text, "hello web01\n");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn universe_is_a_copy_of_the_scope() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let mut scope = scope(json!({"a": 1, "b": 2}));

        let output = renderer
            .render("#for $key in $template_universe\n$key\n#end for\n", &mut scope)
            .unwrap();
        assert_eq!(output.text, "a\nb\n");
        assert_eq!(scope[keys::TEMPLATE_UNIVERSE], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn unresolved_placeholders_are_advisory() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let output = renderer.render("echo $HOSTNAME\n", &mut Context::new()).unwrap();
        assert_eq!(output.text, "echo $HOSTNAME\n");
        assert!(matches!(
            &output.diagnostics[..],
            [Diagnostic::UnresolvedPlaceholder { code, .. }] if code == "$HOSTNAME"
        ));
    }

    #[test]
    fn rejected_import_stops_before_rendering() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let err = renderer.render("#import os\n$x\n", &mut Context::new()).unwrap_err();
        assert!(matches!(err, Error::SecurityViolationError { target } if target == "os"));
    }

    #[test]
    fn whitelisted_import_is_a_no_op() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let output = renderer.render("#import time\nok\n", &mut Context::new()).unwrap();
        assert_eq!(output.text, "ok\n");
    }

    #[test]
    fn missing_macro_library_is_fatal() {
        let fx = fixture("");
        let settings = Settings {
            legacy_macros_file: fx.settings.snippets_dir.join("no-such-file"),
            ..fx.settings.clone()
        };
        let renderer = LegacyRenderer::new(&settings);
        let err = renderer.render("plain\n", &mut Context::new()).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError { .. }));
    }

    #[test]
    fn directive_failure_is_a_render_error() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let err = renderer.render("#if $undefined\nx\n#end if\n", &mut Context::new()).unwrap_err();
        assert!(matches!(err, Error::RenderExecutionError(msg) if msg.contains("undefined")));
    }

    #[test]
    fn unbalanced_template_is_a_render_error() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let err = renderer.render("#for $x in $xs\n", &mut Context::new()).unwrap_err();
        assert!(matches!(err, Error::RenderExecutionError(_)));
    }

    #[test]
    fn snippet_capability_follows_settings() {
        let fx = fixture("");
        std::fs::write(fx.settings.snippets_dir.join("post"), "echo done\n").unwrap();

        let enabled = LegacyRenderer::new(&fx.settings);
        assert!(enabled.supports_snippets());
        let output = enabled.render("$SNIPPET('post')", &mut Context::new()).unwrap();
        assert_eq!(output.text, "echo done\n");

        let disabled =
            LegacyRenderer::new(&Settings { snippet_inclusion: false, ..fx.settings.clone() });
        assert!(!disabled.supports_snippets());
        let output = disabled.render("$SNIPPET('post')", &mut Context::new()).unwrap();
        assert_eq!(output.text, "$SNIPPET('post')");
        assert_eq!(output.diagnostics.len(), 1);
    }

    #[test]
    fn nfs_tree_is_rewritten_before_compiling() {
        let fx = fixture("");
        let renderer = LegacyRenderer::new(&fx.settings);
        let mut scope = scope(json!({"tree": "nfs://myserver:/export/dir"}));
        let output = renderer.render("url --url=$tree\n", &mut scope).unwrap();
        assert_eq!(
            output.text,
            "nfs --server myserver --dir /export/dir\n#url --url=nfs://myserver:/export/dir\n"
        );
    }
}
