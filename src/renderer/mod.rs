//! Template engines behind one rendering contract.
//!
//! - `legacy`: the `$placeholder` / `#directive` language with macro
//!   library, snippets and import whitelisting
//! - `minijinja`: the Jinja-compatible engine (cargo feature `modern`)

pub mod interface;
pub mod legacy;
#[cfg(feature = "modern")]
pub mod minijinja;

pub use self::interface::TemplateRenderer;
pub use self::legacy::LegacyRenderer;
#[cfg(feature = "modern")]
pub use self::minijinja::MiniJinjaRenderer;

use std::fmt::Display;

/// The two template languages the pipeline can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Legacy,
    Modern,
}

impl EngineKind {
    /// Parses an engine name, accepting the historical names as aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "legacy" | "cheetah" => Some(EngineKind::Legacy),
            "modern" | "jinja2" | "jinja" => Some(EngineKind::Modern),
            _ => None,
        }
    }
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineKind::Legacy => "legacy",
            EngineKind::Modern => "modern",
        };
        write!(f, "{s}")
    }
}

/// Engine selector supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateType {
    /// Use the configured default, falling back to the legacy engine.
    Default,
    Engine(EngineKind),
}

impl TemplateType {
    pub fn parse(name: &str) -> Option<Self> {
        if name.trim().eq_ignore_ascii_case("default") {
            Some(TemplateType::Default)
        } else {
            EngineKind::parse(name).map(TemplateType::Engine)
        }
    }
}

/// Advisory message produced while rendering. Never blocks output.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The selector, directive line or configured default named no engine.
    UnsupportedEngine(String),
    /// The engine exists but was compiled out of this build.
    EngineUnavailable(EngineKind),
    /// A legacy placeholder could not be evaluated and was echoed verbatim.
    UnresolvedPlaceholder { line: usize, code: String, reason: String },
    /// The modern engine failed and a placeholder was returned instead.
    ModernRenderFailed(String),
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UnsupportedEngine(name) => {
                write!(f, "unsupported template type '{name}'")
            }
            Diagnostic::EngineUnavailable(kind) => {
                write!(f, "the {kind} template engine is not available in this build")
            }
            Diagnostic::UnresolvedPlaceholder { line, code, reason } => {
                write!(f, "line {line}: {code}: {reason}")
            }
            Diagnostic::ModernRenderFailed(reason) => {
                write!(f, "modern template processing failed: {reason}")
            }
        }
    }
}

/// What an engine hands back to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl EngineOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), diagnostics: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_and_aliases() {
        assert_eq!(EngineKind::parse("legacy"), Some(EngineKind::Legacy));
        assert_eq!(EngineKind::parse("Cheetah"), Some(EngineKind::Legacy));
        assert_eq!(EngineKind::parse(" MODERN "), Some(EngineKind::Modern));
        assert_eq!(EngineKind::parse("jinja2"), Some(EngineKind::Modern));
        assert_eq!(EngineKind::parse("bogus"), None);
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(TemplateType::parse("default"), Some(TemplateType::Default));
        assert_eq!(
            TemplateType::parse("modern"),
            Some(TemplateType::Engine(EngineKind::Modern))
        );
        assert_eq!(TemplateType::parse(""), None);
    }

    #[test]
    fn diagnostics_display() {
        let diagnostic = Diagnostic::UnresolvedPlaceholder {
            line: 3,
            code: "$missing".to_string(),
            reason: "cannot find 'missing'".to_string(),
        };
        assert_eq!(diagnostic.to_string(), "line 3: $missing: cannot find 'missing'");
        assert_eq!(
            Diagnostic::EngineUnavailable(EngineKind::Modern).to_string(),
            "the modern template engine is not available in this build"
        );
    }
}
