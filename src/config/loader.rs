//! Settings loading and management

use crate::constants::{
    DEFAULT_IMPORT_WHITELIST, DEFAULT_MACROS_FILE, DEFAULT_SERVER, DEFAULT_SNIPPETS_DIR,
    SETTINGS_EXTENSIONS,
};
use crate::error::{Error, Result};
use indexmap::IndexSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Read-only configuration consulted on every render call.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Engine used when a caller asks for `default`.
    #[serde(default)]
    pub default_template_type: Option<String>,
    /// Imports a legacy template may name. `None` disables the check.
    #[serde(default = "get_default_import_whitelist")]
    pub legacy_import_whitelist: Option<IndexSet<String>>,
    /// Search root for `{% include %}` and friends in the modern engine.
    #[serde(default)]
    pub include_dir: Option<PathBuf>,
    /// Identity used for `http_server` when the context has no `server`.
    #[serde(default = "get_default_server")]
    pub server: String,
    #[serde(default = "get_default_macros_file")]
    pub legacy_macros_file: PathBuf,
    #[serde(default = "get_default_snippets_dir")]
    pub snippets_dir: PathBuf,
    /// Whether `$SNIPPET` and `$read_snippet` are available to legacy templates.
    #[serde(default = "get_default_snippet_inclusion")]
    pub snippet_inclusion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_template_type: None,
            legacy_import_whitelist: get_default_import_whitelist(),
            include_dir: None,
            server: get_default_server(),
            legacy_macros_file: get_default_macros_file(),
            snippets_dir: get_default_snippets_dir(),
            snippet_inclusion: get_default_snippet_inclusion(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML or JSON file, chosen by extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();

        let content = std::fs::read_to_string(path)?;
        let settings = match extension {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            _ => {
                return Err(Error::SettingsFormatError {
                    path: path.display().to_string(),
                    expected: SETTINGS_EXTENSIONS.join(", "),
                })
            }
        };
        log::debug!("Loaded settings from {}", path.display());

        Ok(settings)
    }

    /// Loads settings from `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("Settings file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

fn get_default_import_whitelist() -> Option<IndexSet<String>> {
    Some(DEFAULT_IMPORT_WHITELIST.iter().map(|s| s.to_string()).collect())
}

fn get_default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn get_default_macros_file() -> PathBuf {
    PathBuf::from(DEFAULT_MACROS_FILE)
}

fn get_default_snippets_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SNIPPETS_DIR)
}

fn get_default_snippet_inclusion() -> bool {
    true
}
