use crate::{
    constants::STDIN_INDICATOR,
    context::Context,
    error::Result,
    ioutils::{parse_string_to_json, parse_string_to_yaml, read_from},
};
use std::path::Path;

/// Loads the render context named on the command line.
///
/// Files are parsed by extension (`.json`, otherwise YAML). Stdin content is
/// tried as JSON first, then as YAML.
pub fn load_context(source: Option<&str>) -> Result<Context> {
    match source {
        None => Ok(Context::new()),
        Some(STDIN_INDICATOR) => parse_any(read_from(std::io::stdin())?),
        Some(path) => load_context_file(Path::new(path)),
    }
}

pub fn load_context_file(path: &Path) -> Result<Context> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_string_to_json(content),
        _ => parse_string_to_yaml(content),
    }
}

fn parse_any(content: String) -> Result<Context> {
    match parse_string_to_json(content.clone()) {
        Ok(context) => Ok(context),
        Err(err) => {
            log::debug!("Context is not JSON ({err}), trying YAML");
            parse_string_to_yaml(content)
        }
    }
}
