//! Source rewrites applied before a legacy template is compiled.

use crate::constants::{keys, legacy};
use crate::context::Context;
use crate::error::{Error, Result};

/// Replaces the older `TEMPLATE::` spelling with the `$` sigil.
pub fn substitute_alias(source: &str) -> String {
    source.replace(legacy::VARIABLE_ALIAS, legacy::VARIABLE_SIGIL)
}

/// Turns `url --url=...` install-source lines into an explicit network
/// filesystem directive when the install tree lives on, e.g., an NFS share.
///
/// The original path is kept as a `#url` comment line after the directive so
/// tooling reading the rendered file can still recover it.
pub fn rewrite_network_tree(source: &str, context: &Context) -> Result<String> {
    let Some(tree) = context.get(keys::TREE).and_then(|tree| tree.as_str()) else {
        return Ok(source.to_string());
    };
    let Some((scheme, location)) = split_network_scheme(tree) else {
        return Ok(source.to_string());
    };

    let mut lines = Vec::new();
    for line in source.split('\n') {
        if line.contains(legacy::URL_MARKER) && line.contains(legacy::INSTALL_SOURCE_MARKER) {
            let (server, directory) = parse_location(location)
                .ok_or_else(|| Error::SyntaxError { tree: tree.to_string() })?;
            lines.push(format!(
                "{scheme} --server {server} --dir {directory}\n#url --url={tree}"
            ));
        } else {
            lines.push(line.to_string());
        }
    }
    Ok(lines.join("\n"))
}

/// Asks the engine to echo unresolved placeholders instead of failing.
pub fn inject_error_catcher(source: &str) -> String {
    format!("{}{source}", legacy::ERROR_CATCHER_DIRECTIVE)
}

fn split_network_scheme(tree: &str) -> Option<(&'static str, &str)> {
    legacy::NETWORK_FS_SCHEMES.iter().find_map(|scheme| {
        tree.strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .map(|location| (*scheme, location))
    })
}

/// `host:/directory`, exactly one separator.
fn parse_location(location: &str) -> Option<(&str, &str)> {
    let mut parts = location.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(server), Some(directory), None) => Some((server, directory)),
        _ => None,
    }
}
