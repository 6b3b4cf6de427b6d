//! Engine-agnostic transformations applied to rendered text.

use crate::constants::keys;
use crate::context::{value_to_text, Context};
use crate::error::{Error, Result};
use crate::ioutils::write_file;
use indexmap::IndexSet;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const DEFAULT_HTTP_PORT: u16 = 80;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@@\S*?@@").expect("token pattern is valid"))
}

/// Host identity as clients should see it: `server`, or `server:port` when
/// the port is not 80.
pub fn http_server(context: &Context, default_server: &str) -> String {
    let server = match context.get(keys::SERVER) {
        Some(Value::Null) | None => default_server.to_string(),
        Some(server) => value_to_text(server),
    };
    match context.get(keys::HTTP_PORT) {
        Some(port) if !is_default_port(port) => format!("{server}:{}", value_to_text(port)),
        _ => server,
    }
}

fn is_default_port(port: &Value) -> bool {
    match port {
        Value::Null => true,
        Value::Number(n) => n.as_f64() == Some(f64::from(DEFAULT_HTTP_PORT)),
        Value::String(s) => s.trim() == DEFAULT_HTTP_PORT.to_string(),
        _ => false,
    }
}

/// Replaces every `@@key@@` token with the textual form of `scope[key]`.
///
/// Text without tokens is returned unchanged. A token whose key is absent
/// from `scope` fails the whole call.
pub fn substitute_tokens(text: &str, scope: &Context) -> Result<String> {
    let tokens: IndexSet<&str> = token_pattern().find_iter(text).map(|m| m.as_str()).collect();
    if tokens.is_empty() {
        return Ok(text.to_string());
    }

    let mut output = text.to_string();
    for token in tokens {
        let key = token.trim_matches('@');
        let value = scope.get(key).ok_or_else(|| {
            log::error!("Token {token} has no value in the render context");
            Error::TokenLookupError { token: key.to_string() }
        })?;
        output = output.replace(token, &value_to_text(value));
    }
    Ok(output)
}

pub fn trim_leading_newlines(text: &str) -> &str {
    text.trim_start_matches('\n')
}

/// Runs the post-render steps over engine output.
pub struct PostProcessor<'a> {
    default_server: &'a str,
}

impl<'a> PostProcessor<'a> {
    pub fn new(default_server: &'a str) -> Self {
        Self { default_server }
    }

    /// Adds `http_server` to `scope`, resolves tokens, trims the leading
    /// newlines and, with an output path, writes the result there.
    ///
    /// Returns the final text and the computed host string.
    pub fn apply(
        &self,
        text: &str,
        scope: &mut Context,
        output_path: Option<&Path>,
    ) -> Result<(String, String)> {
        let host = http_server(scope, self.default_server);
        scope.insert(keys::HTTP_SERVER.to_string(), Value::String(host.clone()));

        let text = substitute_tokens(text, scope)?;
        let text = trim_leading_newlines(&text).to_string();

        if let Some(path) = output_path {
            log::debug!("Writing rendered output to {}", path.display());
            write_file(&text, path)?;
        }
        Ok((text, host))
    }
}
