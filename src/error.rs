use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}.")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON. Original error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse YAML. Original error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Settings file '{path}' has an unsupported format. Expected one of: {expected}.")]
    SettingsFormatError { path: String, expected: String },

    /// A legacy template imports a module that is not on the whitelist.
    #[error("Potentially insecure import in template: {target}")]
    SecurityViolationError { target: String },

    /// The macro library could not be read, legacy rendering cannot proceed.
    #[error("Cannot read macro library '{path}'. Original error: {source}")]
    ConfigurationError { path: String, source: std::io::Error },

    #[error("Invalid syntax for network path given during import: {tree}")]
    SyntaxError { tree: String },

    /// The legacy engine failed to compile or execute a template.
    #[error("Error templating file: {0}")]
    RenderExecutionError(String),

    #[error("No value for token '{token}' in the render context.")]
    TokenLookupError { token: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience type alias for Results with templar's Error as the error type.
///
/// # Type Parameters
/// * `T` - The type of the success value
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(crate::constants::exit_codes::FAILURE);
}
