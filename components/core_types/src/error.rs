//! Runtime result codes and the API error type.
//!
//! These errors cover API misuse and environment failures only. Script-level
//! exceptions are a separate channel owned by the execution context.

use std::fmt;

/// Stable result codes returned by every runtime entry point.
///
/// The integer values are part of the host contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unclassified failure
    UnspecifiedFailure,
    /// An argument was outside its accepted domain
    InvalidArg,
    /// A value or handle had the wrong type for the operation
    InvalidType,
    /// Input data was malformed
    InvalidData,
    /// A range argument was inverted or empty
    InvalidRange,
    /// The operation is not valid in the current state
    InvalidOperation,
    /// Memory reservation failed
    BadAllocation,
    /// A key or name is already registered
    Duplicate,
    /// A key or name is not registered
    NonExistent,
    /// An index was outside the container bounds
    OutOfRange,
    /// A value belongs to a different virtual machine
    Mismatch,
    /// A file could not be opened
    FailedToOpenFile,
    /// A file could be opened but not parsed
    FailedToParseFile,
    /// A read went past the end of a stream
    StreamEnd,
    /// A pop was attempted on an empty stack
    StackEmpty,
    /// A push was attempted on a full stack
    StackFull,
    /// The execution context has no active function
    ScriptNoFunction,
    /// An identifier did not resolve
    UnknownId,
    /// A write was attempted on read-only storage
    NoWrite,
    /// The operation is not implemented
    NotImplemented,
}

impl ErrorCode {
    /// Returns the integer code shared with hosts.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::UnspecifiedFailure => -1,
            ErrorCode::InvalidArg => -2,
            ErrorCode::InvalidType => -3,
            ErrorCode::InvalidData => -4,
            ErrorCode::InvalidRange => -5,
            ErrorCode::InvalidOperation => -6,
            ErrorCode::BadAllocation => -7,
            ErrorCode::Duplicate => -8,
            ErrorCode::NonExistent => -9,
            ErrorCode::OutOfRange => -10,
            ErrorCode::Mismatch => -11,
            ErrorCode::FailedToOpenFile => -12,
            ErrorCode::FailedToParseFile => -13,
            ErrorCode::StreamEnd => -14,
            ErrorCode::StackEmpty => -15,
            ErrorCode::StackFull => -16,
            ErrorCode::ScriptNoFunction => -17,
            ErrorCode::UnknownId => -18,
            ErrorCode::NoWrite => -19,
            ErrorCode::NotImplemented => -99,
        }
    }

    /// Maps an integer code back to its variant. `0` (success) has no variant.
    pub fn from_code(code: i32) -> Option<Self> {
        let found = match code {
            -1 => ErrorCode::UnspecifiedFailure,
            -2 => ErrorCode::InvalidArg,
            -3 => ErrorCode::InvalidType,
            -4 => ErrorCode::InvalidData,
            -5 => ErrorCode::InvalidRange,
            -6 => ErrorCode::InvalidOperation,
            -7 => ErrorCode::BadAllocation,
            -8 => ErrorCode::Duplicate,
            -9 => ErrorCode::NonExistent,
            -10 => ErrorCode::OutOfRange,
            -11 => ErrorCode::Mismatch,
            -12 => ErrorCode::FailedToOpenFile,
            -13 => ErrorCode::FailedToParseFile,
            -14 => ErrorCode::StreamEnd,
            -15 => ErrorCode::StackEmpty,
            -16 => ErrorCode::StackFull,
            -17 => ErrorCode::ScriptNoFunction,
            -18 => ErrorCode::UnknownId,
            -19 => ErrorCode::NoWrite,
            -99 => ErrorCode::NotImplemented,
            _ => return None,
        };
        Some(found)
    }

    fn label(self) -> &'static str {
        match self {
            ErrorCode::UnspecifiedFailure => "unspecified failure",
            ErrorCode::InvalidArg => "invalid argument",
            ErrorCode::InvalidType => "invalid type",
            ErrorCode::InvalidData => "invalid data",
            ErrorCode::InvalidRange => "invalid range",
            ErrorCode::InvalidOperation => "invalid operation",
            ErrorCode::BadAllocation => "bad allocation",
            ErrorCode::Duplicate => "key already exists",
            ErrorCode::NonExistent => "key does not exist",
            ErrorCode::OutOfRange => "index out of range",
            ErrorCode::Mismatch => "mismatch",
            ErrorCode::FailedToOpenFile => "failed to open file",
            ErrorCode::FailedToParseFile => "failed to parse file",
            ErrorCode::StreamEnd => "end of stream",
            ErrorCode::StackEmpty => "stack empty",
            ErrorCode::StackFull => "stack full",
            ErrorCode::ScriptNoFunction => "no script function",
            ErrorCode::UnknownId => "unknown identifier",
            ErrorCode::NoWrite => "write not permitted",
            ErrorCode::NotImplemented => "not implemented",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An API error: a stable code plus context for humans.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorCode, HqError};
///
/// let err = HqError::new(ErrorCode::InvalidArg, "register index 99");
/// assert_eq!(err.code(), ErrorCode::InvalidArg);
/// assert_eq!(err.code().code(), -2);
/// assert_eq!(err.to_string(), "invalid argument: register index 99");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HqError {
    code: ErrorCode,
    message: String,
}

impl HqError {
    /// Creates an error with a context message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The result code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The context message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorCode> for HqError {
    fn from(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.label().to_string(),
        }
    }
}

/// Result alias used across the runtime.
pub type HqResult<T> = Result<T, HqError>;
