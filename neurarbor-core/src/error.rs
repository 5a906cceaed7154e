//! Error types for neurarbor-core.

use thiserror::Error;

/// Result type alias for neurarbor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Polymorphic constructors use this to fall through from one neuron variant
/// to the next on [`ErrorKind::Construction`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input cannot build any recognized neuron variant.
    Construction,
    /// Tabular data is malformed or labels are ambiguous.
    Validation,
    /// An id, attribute, node or index could not be resolved.
    Lookup,
    /// Attribute kinds are inconsistent across a collection.
    TypeMismatch,
    /// Operation not defined for the operand.
    Unsupported,
    /// Unit parsing or conversion failed.
    Units,
    /// Underlying I/O, serialization or runtime failure.
    Runtime,
}

/// Core error types for neurarbor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input could not be turned into a neuron of the requested variant.
    #[error("unable to construct neuron: {0}")]
    Construction(String),

    /// Table is missing required columns or contains invalid values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Attribute does not exist on the neuron or on any neuron of a list.
    #[error("attribute \"{0}\" not found")]
    AttributeNotFound(String),

    /// Attribute exists on some but not all neurons of a list.
    #[error("attribute or function \"{0}\" missing for some neurons")]
    AttributeMissing(String),

    /// One or more requested neuron ids are absent.
    #[error("no neuron(s) with ID(s): {}", .0.join(", "))]
    IdNotFound(Vec<String>),

    /// Indexing a list matched nothing.
    #[error("no neuron matching the search criteria")]
    NoMatch,

    /// Node id is not part of the node table.
    #[error("node {0} not found in node table")]
    NodeNotFound(i64),

    /// Positional index outside of the list.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// Attribute resolves to methods for some neurons and values for others.
    #[error("found both methods and attributes with name \"{0}\" among neurons")]
    TypeMismatch(String),

    /// Operation is not implemented for this operand.
    #[error("not implemented: {0}")]
    Unsupported(String),

    /// Unit parsing or conversion error.
    #[error("unit error: {0}")]
    Units(String),

    /// Invalid name pattern.
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Construction(_) => ErrorKind::Construction,
            Self::Validation(_) | Self::Regex(_) => ErrorKind::Validation,
            Self::AttributeNotFound(_)
            | Self::AttributeMissing(_)
            | Self::IdNotFound(_)
            | Self::NoMatch
            | Self::NodeNotFound(_)
            | Self::IndexOutOfRange { .. } => ErrorKind::Lookup,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Units(_) => ErrorKind::Units,
            Self::ThreadPool(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Runtime,
        }
    }

    /// Returns true if this is a construction failure.
    #[must_use]
    pub fn is_construction(&self) -> bool {
        self.kind() == ErrorKind::Construction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(Error::Construction("int".into()).is_construction());
        assert_eq!(Error::NoMatch.kind(), ErrorKind::Lookup);
        assert_eq!(
            Error::TypeMismatch("x".into()).kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_missing_ids_are_named() {
        let err = Error::IdNotFound(vec!["12".into(), "abc".into()]);
        assert_eq!(err.to_string(), "no neuron(s) with ID(s): 12, abc");
    }
}
