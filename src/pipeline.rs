//! Public entry point: engine resolution, dispatch, post-processing and
//! optional persistence.

use crate::{
    config::Settings,
    constants::{keys, placeholders, TEMPLATE_DIRECTIVE},
    context::{ComputedFields, Context},
    error::Result,
    ioutils::read_from,
    postprocess::PostProcessor,
    renderer::{
        interface::TemplateRenderer, Diagnostic, EngineKind, LegacyRenderer, TemplateType,
    },
};
use log::{debug, warn};
use std::path::{Path, PathBuf};

#[cfg(feature = "modern")]
use crate::renderer::MiniJinjaRenderer;

/// One render call's input.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: String,
    pub context: Context,
    pub output_path: Option<PathBuf>,
    /// `default`, `legacy` or `modern` (aliases accepted).
    pub template_type: String,
}

impl RenderRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            context: Context::new(),
            output_path: None,
            template_type: "default".to_string(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_output_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_template_type(mut self, template_type: impl Into<String>) -> Self {
        self.template_type = template_type.into();
        self
    }
}

/// One render call's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderResult {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Engine that produced `text`; `None` when selection failed.
    pub engine: Option<EngineKind>,
    pub computed: ComputedFields,
}

impl RenderResult {
    fn placeholder(text: impl Into<String>, diagnostic: Diagnostic) -> Self {
        Self { text: text.into(), diagnostics: vec![diagnostic], ..Self::default() }
    }
}

/// Outcome of engine selection for one call.
enum Selection<'s> {
    Engine(EngineKind, &'s str),
    Unsupported(RenderResult),
}

/// Renders templates with either engine and post-processes the result.
///
/// Holds no per-call state, so one instance can serve concurrent callers.
pub struct Templar {
    settings: Settings,
    legacy: LegacyRenderer,
    #[cfg(feature = "modern")]
    modern: MiniJinjaRenderer,
}

impl Templar {
    pub fn new(settings: Settings) -> Self {
        Self {
            legacy: LegacyRenderer::new(&settings),
            #[cfg(feature = "modern")]
            modern: MiniJinjaRenderer::new(&settings),
            settings,
        }
    }

    /// Renders `request`, writing the text to its output path if one is set.
    ///
    /// Selection problems and modern-engine failures come back as placeholder
    /// text with diagnostics. Import violations, macro library problems,
    /// malformed network paths, legacy failures, unknown tokens and write
    /// failures are errors.
    pub fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let (kind, source) = match self.select(&request.template_type, &request.source) {
            Selection::Engine(kind, source) => (kind, source),
            Selection::Unsupported(result) => return Ok(result),
        };

        let Some(engine) = self.engine(kind) else {
            warn!("Template requested the {kind} engine, which this build does not include");
            return Ok(RenderResult::placeholder(
                placeholders::MODERN_UNAVAILABLE,
                Diagnostic::EngineUnavailable(kind),
            ));
        };
        debug!("Rendering template with the {} engine", engine.kind());

        let mut scope = request.context.clone();
        let output = engine.render(source, &mut scope)?;

        let template_universe = match kind {
            EngineKind::Legacy => {
                scope.get(keys::TEMPLATE_UNIVERSE).and_then(|u| u.as_object()).cloned()
            }
            EngineKind::Modern => None,
        };

        let (text, host) = PostProcessor::new(&self.settings.server).apply(
            &output.text,
            &mut scope,
            request.output_path.as_deref(),
        )?;

        Ok(RenderResult {
            text,
            diagnostics: output.diagnostics,
            engine: Some(kind),
            computed: ComputedFields { http_server: Some(host), template_universe },
        })
    }

    /// Renders `source` against `context` with the default engine selection.
    pub fn render_str(&self, source: &str, context: &Context) -> Result<RenderResult> {
        self.render(&RenderRequest::new(source).with_context(context.clone()))
    }

    /// Reads the whole template from `reader`, then renders it.
    pub fn render_reader(
        &self,
        reader: impl std::io::Read,
        context: &Context,
        output_path: Option<&Path>,
        template_type: &str,
    ) -> Result<RenderResult> {
        let mut request = RenderRequest::new(read_from(reader)?)
            .with_context(context.clone())
            .with_template_type(template_type);
        request.output_path = output_path.map(Path::to_path_buf);
        self.render(&request)
    }

    fn select<'s>(&self, requested: &str, source: &'s str) -> Selection<'s> {
        let Some(requested) = TemplateType::parse(requested) else {
            warn!("Unsupported template type '{requested}' selected");
            return Selection::Unsupported(RenderResult::placeholder(
                placeholders::UNSUPPORTED_SELECTOR,
                Diagnostic::UnsupportedEngine(requested.to_string()),
            ));
        };

        if let Some((name, body)) = split_directive(source) {
            debug!("Template directive selects '{name}'");
            return match EngineKind::parse(&name) {
                Some(kind) => Selection::Engine(kind, body),
                None => unsupported_type(&name),
            };
        }

        match requested {
            TemplateType::Engine(kind) => Selection::Engine(kind, source),
            TemplateType::Default => match self.settings.default_template_type.as_deref() {
                None => Selection::Engine(EngineKind::Legacy, source),
                Some(name) => match EngineKind::parse(name) {
                    Some(kind) => Selection::Engine(kind, source),
                    None => unsupported_type(name),
                },
            },
        }
    }

    fn engine(&self, kind: EngineKind) -> Option<&dyn TemplateRenderer> {
        match kind {
            EngineKind::Legacy => Some(&self.legacy),
            #[cfg(feature = "modern")]
            EngineKind::Modern => Some(&self.modern),
            #[cfg(not(feature = "modern"))]
            EngineKind::Modern => None,
        }
    }
}

fn unsupported_type(name: &str) -> Selection<'static> {
    warn!("Unsupported template type '{name}'");
    Selection::Unsupported(RenderResult::placeholder(
        placeholders::unsupported_type(name),
        Diagnostic::UnsupportedEngine(name.to_string()),
    ))
}

/// Splits a leading `#template=<name>` line off `source`.
fn split_directive(source: &str) -> Option<(String, &str)> {
    let rest = source.strip_prefix(TEMPLATE_DIRECTIVE)?;
    let (line, body) = rest.split_once('\n').unwrap_or((rest, ""));
    Some((line.trim().to_lowercase(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        templar: Templar,
    }

    fn fixture(configure: impl FnOnce(&mut Settings)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let macros = dir.path().join("macros");
        std::fs::write(&macros, "").unwrap();
        let mut settings = Settings {
            legacy_macros_file: macros,
            snippets_dir: dir.path().join("snippets"),
            server: "cfg-server".to_string(),
            ..Settings::default()
        };
        configure(&mut settings);
        Fixture { dir, templar: Templar::new(settings) }
    }

    fn context(value: serde_json::Value) -> Context {
        value.as_object().cloned().unwrap_or_default()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn templar_can_be_shared_across_threads() {
        assert_send_sync::<Templar>();
        assert_send_sync::<RenderRequest>();
        assert_send_sync::<RenderResult>();
    }

    #[test]
    fn directive_is_split_and_lowercased() {
        assert_eq!(split_directive("#template=Modern\nbody"), Some(("modern".to_string(), "body")));
        assert_eq!(split_directive("#template=legacy"), Some(("legacy".to_string(), "")));
        assert_eq!(split_directive("body\n#template=modern"), None);
    }

    #[test]
    fn default_selector_falls_back_to_legacy() {
        let fx = fixture(|_| {});
        let result = fx.templar.render_str("#set $x = 1\n$x\n", &Context::new()).unwrap();
        assert_eq!(result.engine, Some(EngineKind::Legacy));
        assert_eq!(result.text, "1\n");
    }

    #[test]
    fn unknown_selector_is_a_placeholder() {
        let fx = fixture(|_| {});
        let path = fx.dir.path().join("out");
        let request = RenderRequest::new("text")
            .with_template_type("bogus")
            .with_output_path(&path);

        let result = fx.templar.render(&request).unwrap();
        assert_eq!(result.text, placeholders::UNSUPPORTED_SELECTOR);
        assert_eq!(result.engine, None);
        assert_eq!(result.diagnostics, vec![Diagnostic::UnsupportedEngine("bogus".into())]);
        assert!(!path.exists());
    }

    #[test]
    fn unknown_directive_name_is_a_placeholder() {
        let fx = fixture(|_| {});
        let result = fx.templar.render_str("#template=mako\nbody", &Context::new()).unwrap();
        assert_eq!(result.text, "# ERROR: UNSUPPORTED TEMPLATE TYPE (mako)");
    }

    #[test]
    fn unknown_configured_default_is_a_placeholder() {
        let fx = fixture(|s| s.default_template_type = Some("erb".into()));
        let result = fx.templar.render_str("body", &Context::new()).unwrap();
        assert_eq!(result.text, "# ERROR: UNSUPPORTED TEMPLATE TYPE (erb)");
    }

    #[test]
    fn computed_fields_leave_caller_context_untouched() {
        let fx = fixture(|_| {});
        let ctx = context(json!({"http_port": 8080}));
        let result = fx.templar.render_str("@@http_server@@", &ctx).unwrap();

        assert_eq!(result.text, "cfg-server:8080");
        assert_eq!(result.computed.http_server.as_deref(), Some("cfg-server:8080"));
        assert_eq!(result.computed.template_universe, Some(ctx.clone()));
        assert!(!ctx.contains_key(keys::HTTP_SERVER));
        assert!(!ctx.contains_key(keys::TEMPLATE_UNIVERSE));
    }

    #[test]
    fn render_reader_persists_output() {
        let fx = fixture(|_| {});
        let path = fx.dir.path().join("out").join("ks.cfg");
        let result = fx
            .templar
            .render_reader("\n\nhost $name\n".as_bytes(), &context(json!({"name": "a"})), Some(&path), "legacy")
            .unwrap();
        assert_eq!(result.text, "host a\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "host a\n");
    }

    #[cfg(feature = "modern")]
    #[test]
    fn directive_overrides_requested_engine() {
        let fx = fixture(|_| {});
        let request = RenderRequest::new("#template=modern\nhello {{ name }}")
            .with_context(context(json!({"name": "web01"})))
            .with_template_type("legacy");
        let result = fx.templar.render(&request).unwrap();
        assert_eq!(result.engine, Some(EngineKind::Modern));
        assert_eq!(result.text, "hello web01");
        assert_eq!(result.computed.template_universe, None);
    }

    #[cfg(feature = "modern")]
    #[test]
    fn configured_default_selects_modern() {
        let fx = fixture(|s| s.default_template_type = Some("jinja2".into()));
        let result = fx.templar.render_str("{{ 1 + 1 }}", &Context::new()).unwrap();
        assert_eq!(result.engine, Some(EngineKind::Modern));
        assert_eq!(result.text, "2");
    }

    #[cfg(not(feature = "modern"))]
    #[test]
    fn modern_engine_compiled_out() {
        let fx = fixture(|_| {});
        let request = RenderRequest::new("{{ x }}").with_template_type("modern");
        let result = fx.templar.render(&request).unwrap();
        assert_eq!(result.text, placeholders::MODERN_UNAVAILABLE);
        assert_eq!(result.diagnostics, vec![Diagnostic::EngineUnavailable(EngineKind::Modern)]);
    }
}
