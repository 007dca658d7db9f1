use thiserror::Error;

use crate::interpreter::InterpreterError;

#[derive(Debug, Error)]
pub enum SynthError {
    /// Automatic interaction was requested, but there is nothing to answer with.
    #[error("Automatic interaction requires a non-empty ground truth regex.")]
    MissingGroundTruth,

    #[error("Ground truth `{pattern}` is not a valid regex: {source}")]
    InvalidGroundTruth {
        pattern: String,
        source: regex::Error,
    },

    /// Grammar construction needs length statistics of the valid examples.
    #[error("At least one valid example is required.")]
    NoValidExamples,

    #[error("Minimum depth {min} exceeds maximum depth {max}.")]
    InvalidDepthRange { min: usize, max: usize },

    #[error("Capture targets are malformed: expected {expected} entries, found {found}.")]
    CaptureArity { expected: usize, found: usize },

    #[error("The grammar has no production of its start type.")]
    EmptyGrammar,

    #[error("The oracle input was closed before an answer was given.")]
    OracleClosed,

    #[error("Failed to render the solution: {0}")]
    Interpreter(#[from] InterpreterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SynthResult<T> = Result<T, SynthError>;
