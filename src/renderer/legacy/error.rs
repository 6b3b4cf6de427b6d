use thiserror::Error;

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("cannot find '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Type(String),

    #[error("{what} nested deeper than {limit} levels")]
    TooDeep { what: &'static str, limit: usize },

    #[error("line {line}: {source}")]
    Runtime { line: usize, source: Box<LegacyError> },
}

impl LegacyError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        LegacyError::Parse { line, message: message.into() }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        LegacyError::Type(message.into())
    }

    /// Attaches the directive line to an evaluation failure.
    pub fn at(self, line: usize) -> Self {
        match self {
            err @ (LegacyError::Parse { .. } | LegacyError::Runtime { .. }) => err,
            err => LegacyError::Runtime { line, source: Box::new(err) },
        }
    }
}

pub type LegacyResult<T> = std::result::Result<T, LegacyError>;
