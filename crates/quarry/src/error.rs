//! Errors

use thiserror::Error;

use crate::context::Action;

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while composing, compiling, or executing a query.
#[derive(Error, Debug)]
pub enum Error {
    // --- Composition errors ---
    /// The caller asked for something the engine refuses to do, such as an
    /// unfiltered `DELETE` or joining query sets from different sessions.
    #[error("usage: {0}")]
    Usage(String),

    /// An expression shape the compiler does not translate.
    #[error("translation: {0}")]
    Translation(String),

    /// A clause setter was invoked for a transition the state machine forbids.
    #[error("state: cannot move from {from:?} to {to:?}")]
    State {
        /// The cursor position of the context.
        from: Action,
        /// The requested action.
        to: Action,
    },

    /// The entity schema could not be resolved or is malformed.
    #[error("schema: {0}")]
    Schema(String),

    // --- Execution errors ---
    /// A result row could not be converted to the requested type.
    #[error("materialize: {0}")]
    Materialize(String),

    /// Failure reported by the underlying provider, passed through untouched.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Materialize(err.to_string())
    }
}

macro_rules! usage {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Usage(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Usage(format!($desc))
    };
}

macro_rules! translation {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Translation(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Translation(format!($desc))
    };
}

macro_rules! schema_error {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Schema(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Schema(format!($desc))
    };
}

macro_rules! materialize {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Materialize(format!($fmt, $($arg)*))
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Materialize(format!($desc))
    };
}

pub(crate) use {materialize, schema_error, translation, usage};
