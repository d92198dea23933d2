//! Configuration loading and validation errors.

use chassis_core::NameError;

/// Errors raised while loading or validating a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be read from disk.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The document was not valid JSON for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `${VAR}` placeholder referenced an unset environment variable.
    #[error("environment variable {var:?} referenced by config is not set")]
    MissingEnvVar {
        /// The placeholder's variable name.
        var: String,
    },

    /// Two resource configs resolved to the same fully-qualified name.
    #[error("duplicate resource name {name:?}")]
    DuplicateResource {
        /// The offending name.
        name: String,
    },

    /// Two jobs share a name.
    #[error("duplicate job name {name:?}")]
    DuplicateJob {
        /// The offending name.
        name: String,
    },

    /// Two managed processes share an id.
    #[error("duplicate process id {id:?}")]
    DuplicateProcess {
        /// The offending id.
        id: String,
    },

    /// A name, api, or model field failed to parse.
    #[error(transparent)]
    Name(#[from] NameError),
}
