//! Constants used throughout templar

/// Settings file extensions in order of preference
pub const SETTINGS_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Default settings file location used by the CLI
pub const DEFAULT_SETTINGS_FILE: &str = "/etc/templar/settings.yaml";

/// Administrator-maintained macro library for the legacy engine
pub const DEFAULT_MACROS_FILE: &str = "/etc/templar/legacy_macros";

/// Root directory searched by `$SNIPPET`
pub const DEFAULT_SNIPPETS_DIR: &str = "/var/lib/templar/snippets";

/// Server identity used when neither the context nor the settings name one
pub const DEFAULT_SERVER: &str = "127.0.0.1";

/// Imports permitted in legacy templates unless the settings say otherwise
pub const DEFAULT_IMPORT_WHITELIST: &[&str] = &["random", "re", "time", "netaddr"];

/// STDIN indicator for CLI arguments
pub const STDIN_INDICATOR: &str = "-";

/// First-line marker that overrides the engine choice
pub const TEMPLATE_DIRECTIVE: &str = "#template=";

/// Marker scanned by the import whitelist check
pub const IMPORT_DIRECTIVE: &str = "#import";

/// Context keys read or produced by the pipeline
pub mod keys {
    pub const SERVER: &str = "server";
    pub const HTTP_PORT: &str = "http_port";
    pub const HTTP_SERVER: &str = "http_server";
    pub const TREE: &str = "tree";
    pub const TEMPLATE_UNIVERSE: &str = "template_universe";
    pub const SYSTEM_NAME: &str = "system_name";
    pub const PROFILE_NAME: &str = "profile_name";
}

/// Text returned in place of output for non-fatal failures
pub mod placeholders {
    pub const UNSUPPORTED_SELECTOR: &str = "# ERROR: Unsupported template type selected!";
    pub const MODERN_UNAVAILABLE: &str = "# ERROR: MODERN TEMPLATE ENGINE NOT AVAILABLE\n";
    pub const MODERN_FAILED: &str =
        "# EXCEPTION OCCURRED DURING MODERN TEMPLATE PROCESSING\n";

    pub fn unsupported_type(name: &str) -> String {
        format!("# ERROR: UNSUPPORTED TEMPLATE TYPE ({name})")
    }
}

/// Legacy engine compatibility rewrites
pub mod legacy {
    /// Older, more readable spelling of the `$` sigil
    pub const VARIABLE_ALIAS: &str = "TEMPLATE::";
    pub const VARIABLE_SIGIL: &str = "$";
    pub const ERROR_CATCHER_DIRECTIVE: &str = "#errorCatcher ListErrors\n";
    /// Network filesystem schemes rewritten into an explicit directive
    pub const NETWORK_FS_SCHEMES: &[&str] = &["nfs"];
    pub const INSTALL_SOURCE_MARKER: &str = "url ";
    pub const URL_MARKER: &str = "--url";
    pub const MAX_SNIPPET_DEPTH: usize = 16;
}

/// Exit codes
pub mod exit_codes {
    pub const FAILURE: i32 = 1;
}

/// Verbosity levels
pub mod verbosity {
    pub const OFF: u8 = 0;
    pub const INFO: u8 = 1;
    pub const DEBUG: u8 = 2;
    pub const TRACE: u8 = 3;
}
