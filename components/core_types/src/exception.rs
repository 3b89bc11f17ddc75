//! Script exception taxonomy.

use std::fmt;

use crate::constants::STANDARD_EXCEPTION_NAMESPACE;

/// How urgently a raised exception should be treated.
///
/// Both severities are catchable by script handlers. A `Fatal` exception
/// that reaches the host signals that continuing the context is unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExceptionSeverity {
    /// Ordinary, recoverable failure
    #[default]
    Recoverable,
    /// Failure the host should treat as terminal for the context
    Fatal,
}

/// Exceptions defined by the language itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardException {
    /// Generic runtime failure
    RuntimeError,
    /// Operand of an unexpected type
    TypeError,
    /// Integer division or remainder by zero
    DivideByZeroError,
    /// Container index outside its bounds
    IndexOutOfRangeError,
}

impl StandardException {
    /// Every standard exception kind.
    pub const ALL: [StandardException; 4] = [
        StandardException::RuntimeError,
        StandardException::TypeError,
        StandardException::DivideByZeroError,
        StandardException::IndexOutOfRangeError,
    ];

    /// Short kind name.
    pub fn name(self) -> &'static str {
        match self {
            StandardException::RuntimeError => "RuntimeError",
            StandardException::TypeError => "TypeError",
            StandardException::DivideByZeroError => "DivideByZeroError",
            StandardException::IndexOutOfRangeError => "IndexOutOfRangeError",
        }
    }

    /// Fully qualified object class name, e.g.
    /// `Harlequin.System.Exception.TypeError`.
    pub fn class_name(self) -> String {
        format!("{}.{}", STANDARD_EXCEPTION_NAMESPACE, self.name())
    }

    /// Resolves a fully qualified class name.
    pub fn from_class_name(class_name: &str) -> Option<Self> {
        let short = class_name
            .strip_prefix(STANDARD_EXCEPTION_NAMESPACE)?
            .strip_prefix('.')?;
        Self::ALL.iter().copied().find(|kind| kind.name() == short)
    }
}

impl fmt::Display for StandardException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
