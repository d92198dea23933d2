//! Parse errors for identifier types.

/// Errors produced while parsing identifier triples.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// An API triple could not be parsed.
    #[error("invalid api {value:?}: {reason}")]
    InvalidApi {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A model triple could not be parsed.
    #[error("invalid model {value:?}: {reason}")]
    InvalidModel {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A resource name could not be parsed.
    #[error("invalid resource name {value:?}: {reason}")]
    InvalidName {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
