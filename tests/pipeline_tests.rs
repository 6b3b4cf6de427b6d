mod utils;

use serde_json::json;
use templar::{
    constants::placeholders,
    error::Error,
    renderer::{Diagnostic, EngineKind},
    RenderRequest,
};
use test_log::test;
use utils::{context, read, Workspace};

#[test]
fn host_port_normalization() {
    let ws = Workspace::new("");
    let templar = ws.templar();
    let cases = [
        (json!({"server": "h1"}), "h1"),
        (json!({"server": "h1", "http_port": 8080}), "h1:8080"),
        (json!({"server": "h1", "http_port": "80"}), "h1"),
        (json!({"http_port": 81}), "boot.example.org:81"),
    ];
    for (ctx, expected) in cases {
        let result = templar.render_str("@@http_server@@", &context(ctx)).unwrap();
        assert_eq!(result.text, expected);
        assert_eq!(result.computed.http_server.as_deref(), Some(expected));
    }
}

#[test]
fn tokens_resolve_from_context() {
    let ws = Workspace::new("");
    let result = ws
        .templar()
        .render_str("name=@@name@@ again=@@name@@\n", &context(json!({"name": "alpha"})))
        .unwrap();
    assert_eq!(result.text, "name=alpha again=alpha\n");
}

#[test]
fn text_without_tokens_is_untouched() {
    let ws = Workspace::new("");
    let source = "line one\n  indented @ sign\n";
    let result = ws.templar().render_str(source, &context(json!({}))).unwrap();
    assert_eq!(result.text, source);
}

#[test]
fn missing_token_fails_the_call() {
    let ws = Workspace::new("");
    let err = ws.templar().render_str("@@nowhere@@", &context(json!({}))).unwrap_err();
    assert!(matches!(err, Error::TokenLookupError { token } if token == "nowhere"));
}

#[test]
fn leading_newlines_are_trimmed() {
    let ws = Workspace::new("");
    let result = ws.templar().render_str("\n\nfoo\n\nbar", &context(json!({}))).unwrap();
    assert_eq!(result.text, "foo\n\nbar");
}

#[test]
fn bogus_selector_degrades_to_placeholder() {
    let ws = Workspace::new("");
    let request = RenderRequest::new("$x").with_template_type("bogus");
    let result = ws.templar().render(&request).unwrap();
    assert_eq!(result.text, placeholders::UNSUPPORTED_SELECTOR);
    assert_eq!(result.diagnostics, vec![Diagnostic::UnsupportedEngine("bogus".into())]);
}

#[test]
fn rejected_import_produces_no_output_file() {
    let ws = Workspace::new("");
    let output = ws.path("out/ks.cfg");
    let request = RenderRequest::new("#import os\nhostname $name\n")
        .with_context(context(json!({"name": "web01"})))
        .with_template_type("legacy")
        .with_output_path(&output);

    let err = ws.templar().render(&request).unwrap_err();
    assert!(matches!(err, Error::SecurityViolationError { target } if target == "os"));
    assert!(!output.exists());
}

#[test]
fn output_file_matches_returned_text() {
    let ws = Workspace::new("");
    let output = ws.path("out/nested/ks.cfg");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, "stale content that is longer than the new text").unwrap();

    let request = RenderRequest::new("host $name\n")
        .with_context(context(json!({"name": "web01"})))
        .with_output_path(&output);
    let result = ws.templar().render(&request).unwrap();

    assert_eq!(read(&output), result.text);
    assert_eq!(result.text, "host web01\n");
}

#[test]
fn caller_context_is_not_modified() {
    let ws = Workspace::new("");
    let ctx = context(json!({"server": "h1", "http_port": 8080}));
    let before = ctx.clone();
    let result = ws.templar().render_str("$template_universe.server\n", &ctx).unwrap();
    assert_eq!(result.text, "h1\n");
    assert_eq!(ctx, before);
    assert_eq!(result.computed.template_universe, Some(before));
}

#[test]
fn render_reader_matches_render_str() {
    let ws = Workspace::new("");
    let templar = ws.templar();
    let ctx = context(json!({"name": "web01"}));
    let source = "#for $i in [1, 2]\n$name-$i\n#end for\n";

    let from_reader = templar.render_reader(source.as_bytes(), &ctx, None, "legacy").unwrap();
    let from_str = templar.render_str(source, &ctx).unwrap();
    assert_eq!(from_reader.text, "web01-1\nweb01-2\n");
    assert_eq!(from_reader.text, from_str.text);
}

#[test]
fn concurrent_renders_keep_results_apart() {
    let ws = Workspace::new("#def node($n)\nnode-$n#slurp\n#end def\n");
    let templar = ws.templar();
    let source = "$node($id) @@http_server@@ $missing_$id\n";

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|id| {
                let templar = &templar;
                scope.spawn(move || {
                    let ctx = context(json!({
                        "id": id,
                        "server": format!("h{id}"),
                        "http_port": 8000 + id,
                    }));
                    (id, templar.render_str(source, &ctx).unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (id, result) = handle.join().unwrap();
            assert_eq!(result.text, format!("node-{id} h{id}:{} $missing_{id}\n", 8000 + id));
            assert_eq!(result.computed.http_server, Some(format!("h{id}:{}", 8000 + id)));
            assert_eq!(result.diagnostics.len(), 1, "{:?}", result.diagnostics);
            assert!(matches!(
                &result.diagnostics[0],
                Diagnostic::UnresolvedPlaceholder { code, .. } if code == "$missing_"
            ));
        }
    });
}

#[cfg(feature = "modern")]
mod modern {
    use super::*;
    use test_log::test;

    #[test]
    fn directive_always_selects_modern() {
        let ws = Workspace::new("");
        let templar = ws.templar();
        for requested in ["default", "legacy", "modern"] {
            let request = RenderRequest::new("#template=modern\nhost {{ name }}\n")
                .with_context(context(json!({"name": "web01"})))
                .with_template_type(requested);
            let result = templar.render(&request).unwrap();
            assert_eq!(result.engine, Some(EngineKind::Modern));
            assert_eq!(result.text, "host web01\n");
            assert!(!result.text.contains("#template="));
        }
    }

    #[test]
    fn modern_failure_is_a_placeholder() {
        let ws = Workspace::new("");
        let request = RenderRequest::new("{{ name | no_such_filter }}").with_template_type("modern");
        let result = ws.templar().render(&request).unwrap();
        assert_eq!(result.text, placeholders::MODERN_FAILED);
        assert!(matches!(&result.diagnostics[..], [Diagnostic::ModernRenderFailed(_)]));
    }

    #[test]
    fn modern_templates_are_post_processed() {
        let ws = Workspace::new("");
        let request = RenderRequest::new("\n\nurl http://@@http_server@@/{{ path }}")
            .with_context(context(json!({"server": "h1", "http_port": 8080, "path": "os"})))
            .with_template_type("jinja2");
        let result = ws.templar().render(&request).unwrap();
        assert_eq!(result.text, "url http://h1:8080/os");
    }

    #[test]
    fn modern_includes_use_configured_directory() {
        let ws = Workspace::new("");
        ws.write("includes/header.j2", "# managed by templar");
        let request =
            RenderRequest::new("{% include 'header.j2' %}\nok").with_template_type("modern");
        let result = ws.templar().render(&request).unwrap();
        assert_eq!(result.text, "# managed by templar\nok");
    }

    #[test]
    fn modern_skips_import_whitelist() {
        let ws = Workspace::new("");
        let request = RenderRequest::new("#import os\n{{ 1 }}").with_template_type("modern");
        let result = ws.templar().render(&request).unwrap();
        assert_eq!(result.text, "#import os\n1");
    }
}
