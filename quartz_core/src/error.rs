//! Error kinds shared across the runtime.
//!
//! Every fallible operation in the workspace reports one of these kinds. The
//! constructors keep call sites terse; messages are formatted for humans and
//! are what the REPL prints.

use thiserror::Error;

use crate::value::Value;

/// Crate-wide result alias.
pub type Result<T, E = QuartzError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuartzError {
    /// Wrong number of arguments for a callable's declared contract.
    #[error("{0}")]
    Arity(String),

    /// Malformed operand, bad instruction, invalid key, or any other
    /// value-shaped violation.
    #[error("{0}")]
    Value(String),

    /// Out-of-range numeric argument.
    #[error("{0}")]
    Range(String),

    /// A dynamic module could not be opened.
    #[error("could not load native module {path}: {reason}")]
    Load { path: String, reason: String },

    /// Unknown symbol: an undefined binding, a missing entry point in a
    /// native module, or an unregistered native name in a snapshot.
    #[error("{0}")]
    Symbol(String),

    /// Memory reservation failed while copying bytecode or decoding a
    /// snapshot.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// I/O failure surfaced by a native function.
    #[error("io error: {0}")]
    Io(String),

    /// A guest-level `(error x)` with its payload.
    #[error("error: {0}")]
    Raised(Value),

    /// A signal that escaped without a fiber to catch it.
    #[error("unhandled signal {sig}: {payload}")]
    Signal { sig: u8, payload: Value },
}

impl QuartzError {
    #[inline]
    pub fn arity(msg: impl Into<String>) -> Self {
        QuartzError::Arity(msg.into())
    }

    #[inline]
    pub fn value(msg: impl Into<String>) -> Self {
        QuartzError::Value(msg.into())
    }

    #[inline]
    pub fn range(msg: impl Into<String>) -> Self {
        QuartzError::Range(msg.into())
    }

    #[inline]
    pub fn symbol(msg: impl Into<String>) -> Self {
        QuartzError::Symbol(msg.into())
    }

    #[inline]
    pub fn allocation(msg: impl Into<String>) -> Self {
        QuartzError::Allocation(msg.into())
    }

    pub fn load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        QuartzError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The payload a guest error carries, if this is one.
    pub fn raised_payload(&self) -> Option<&Value> {
        match self {
            QuartzError::Raised(v) => Some(v),
            _ => None,
        }
    }
}

impl From<std::io::Error> for QuartzError {
    fn from(err: std::io::Error) -> Self {
        QuartzError::Io(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for QuartzError {
    fn from(err: std::collections::TryReserveError) -> Self {
        QuartzError::Allocation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_formats_path_and_reason() {
        let err = QuartzError::load("/tmp/missing.so", "no such file");
        assert_eq!(
            err.to_string(),
            "could not load native module /tmp/missing.so: no such file"
        );
    }

    #[test]
    fn raised_carries_payload() {
        let err = QuartzError::Raised(Value::from("boom"));
        assert_eq!(err.raised_payload(), Some(&Value::from("boom")));
        assert_eq!(err.to_string(), "error: boom");
    }
}
