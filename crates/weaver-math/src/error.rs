//! Error types for weaver-math

use miette::Diagnostic;

use crate::availability::LoadError;
use crate::engine::EngineError;

/// Main error type for math operations
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum MathError {
    /// No delimiter rule covers the requested display mode
    #[error("no math delimiter configured for display_mode={display_mode}")]
    #[diagnostic(
        code(weaver::math::grammar_mismatch),
        help("add a delimiter rule for both inline and display mode")
    )]
    GrammarMismatch { display_mode: bool },

    /// The typesetting engine faulted instead of rendering error markup
    #[error(transparent)]
    #[diagnostic(code(weaver::math::engine))]
    EngineInvocation(#[from] EngineError),

    /// A persisted fragment is not a math instance
    #[error("fragment is not math content: {0}")]
    #[diagnostic(code(weaver::math::decode_rejected))]
    DecodeRejected(RejectReason),

    /// The typesetting library failed to load for this session
    #[error(transparent)]
    #[diagnostic(code(weaver::math::load_failed))]
    LibraryLoadFailed(#[from] LoadError),

    /// The edit form was committed without an expression
    #[error("Please enter the math expression.")]
    #[diagnostic(code(weaver::math::empty_expression))]
    EmptyExpression,

    /// A required configuration value is not set
    #[error("math config `{0}` must be defined")]
    #[diagnostic(code(weaver::math::missing_config))]
    MissingConfig(&'static str),

    /// Configuration could not be deserialized
    #[error(transparent)]
    #[diagnostic(code(weaver::math::config))]
    Config(#[from] serde_json::Error),
}

/// Why a persisted fragment was not accepted as math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The fragment has no children at all.
    NoContent,
    /// The fragment has more than one child.
    MultipleChildren,
    /// The single child is an element rather than text.
    NotText,
    /// The text child contains an entity that could not be decoded.
    Undecodable,
    /// The expression between the delimiters is empty.
    EmptyExpression,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            RejectReason::NoContent => "no content",
            RejectReason::MultipleChildren => "more than one child",
            RejectReason::NotText => "child is not text",
            RejectReason::Undecodable => "text could not be decoded",
            RejectReason::EmptyExpression => "empty expression",
        };
        f.write_str(reason)
    }
}

pub type Result<T, E = MathError> = std::result::Result<T, E>;
