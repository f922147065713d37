//! Python exception values as they flow through the evaluator.
//!
//! Two layers live here. [`ExcType`] is the closed set of built-in exception
//! classes with their inheritance relation. [`PyExc`] is a raised exception in
//! flight: a built-in or user-defined class tag, the formatted message, and the
//! source line it was raised on. User `try`/`except` matches against either.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Built-in exception types supported by the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Primary exception class - matches any standard exception in except clauses.
    Exception,
    /// Root of the hierarchy; catches everything including exit-style exceptions.
    BaseException,
    /// Raised when a generator is closed.
    GeneratorExit,
    /// Raised by `next()` when an iterator is exhausted.
    StopIteration,

    // --- ArithmeticError hierarchy ---
    /// Intermediate class for arithmetic errors.
    ArithmeticError,
    /// Subclass of ArithmeticError.
    OverflowError,
    /// Subclass of ArithmeticError.
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    /// Intermediate class for lookup errors.
    LookupError,
    /// Subclass of LookupError.
    IndexError,
    /// Subclass of LookupError.
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    /// Subclass of RuntimeError.
    NotImplementedError,
    /// Subclass of RuntimeError.
    RecursionError,

    // --- NameError hierarchy ---
    NameError,
    /// Subclass of NameError - for accessing a local variable before assignment.
    UnboundLocalError,

    // --- ValueError hierarchy ---
    ValueError,
    /// Subclass of ValueError used by `json` decoding failures.
    #[strum(serialize = "JSONDecodeError")]
    JSONDecodeError,

    // --- ImportError hierarchy ---
    ImportError,
    /// Subclass of ImportError - for when a module cannot be found.
    ModuleNotFoundError,

    // --- OSError hierarchy ---
    /// OS-related errors (file not found, permission denied, etc.)
    OSError,
    /// Subclass of OSError.
    FileNotFoundError,
    /// Subclass of OSError.
    FileExistsError,
    /// Subclass of OSError.
    IsADirectoryError,
    /// Subclass of OSError.
    PermissionError,
    /// Subclass of OSError - for failed network operations.
    ConnectionError,

    // --- Standalone exception types ---
    AssertionError,
    AttributeError,
    EOFError,
    MemoryError,
    StopAsyncIteration,
    /// Parser/compiler syntax failures surfaced to user code via dynamic imports.
    SyntaxError,
    /// Subclass of SyntaxError for invalid block indentation.
    IndentationError,
    TimeoutError,
    TypeError,
}

impl ExcType {
    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Implements the built-in exception hierarchy for try/except matching.
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            // BaseException catches all exceptions
            Self::BaseException => true,
            // Exception catches everything except BaseException and GeneratorExit
            Self::Exception => !matches!(self, Self::BaseException | Self::GeneratorExit),
            Self::LookupError => matches!(self, Self::KeyError | Self::IndexError),
            Self::ArithmeticError => matches!(self, Self::ZeroDivisionError | Self::OverflowError),
            Self::RuntimeError => matches!(self, Self::RecursionError | Self::NotImplementedError),
            Self::NameError => matches!(self, Self::UnboundLocalError),
            Self::ValueError => matches!(self, Self::JSONDecodeError),
            Self::ImportError => matches!(self, Self::ModuleNotFoundError),
            Self::OSError => matches!(
                self,
                Self::FileNotFoundError
                    | Self::FileExistsError
                    | Self::IsADirectoryError
                    | Self::PermissionError
                    | Self::ConnectionError
            ),
            // IOError is an alias of OSError in Python 3; we accept the alias at
            // match sites (see `PyExc::matches_name`), so no variant exists for it.
            Self::SyntaxError => matches!(self, Self::IndentationError),
            // All other types only match exactly (handled by self == handler_type above)
            _ => false,
        }
    }

    /// Resolves a built-in exception class name, accepting the `IOError`
    /// alias for `OSError`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "IOError" {
            return Some(Self::OSError);
        }
        name.parse().ok()
    }
}

/// Identity of a raised exception: a built-in class or a user-defined class.
///
/// User classes carry their own name plus the full depth-first ancestry of
/// class names so that except clauses can match transitive bases without
/// access to the live class objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExcClass {
    /// One of the built-in exception types.
    Builtin(ExcType),
    /// A user-defined exception class.
    User {
        /// The class name as written in the `class` statement.
        name: String,
        /// Names of all transitive bases, innermost first. Built-in exception
        /// names appearing here link the user class into the built-in hierarchy.
        ancestry: Vec<String>,
    },
}

impl ExcClass {
    /// The class name used in the string form `"ClassName: message"`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(t) => t.into(),
            Self::User { name, .. } => name,
        }
    }
}

/// A raised exception unwinding through the evaluator.
///
/// The evaluator never uses Rust panics or `?`-incompatible control flow for
/// Python exceptions; a `PyExc` travels inside the unwind branch of every eval
/// result until an except clause consumes it or the host receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyExc {
    /// The exception class identity.
    pub class: ExcClass,
    /// The formatted message (without the leading `"ClassName: "`).
    pub message: String,
    /// Line the exception was raised on, once known.
    pub line: Option<u32>,
    /// Budget exhaustion and internal faults are not catchable by user code.
    pub catchable: bool,
}

impl PyExc {
    /// Creates a catchable built-in exception with a message.
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            class: ExcClass::Builtin(exc_type),
            message: message.into(),
            line: None,
            catchable: true,
        }
    }

    /// Creates an uncatchable exception, used for budget exhaustion and
    /// interpreter invariant violations.
    #[must_use]
    pub fn uncatchable(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            class: ExcClass::Builtin(exc_type),
            message: message.into(),
            line: None,
            catchable: false,
        }
    }

    /// Attaches a source line if none is recorded yet.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// The built-in exception type, if this is (or derives from) one.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match &self.class {
            ExcClass::Builtin(t) => Some(*t),
            ExcClass::User { ancestry, .. } => ancestry.iter().find_map(|n| ExcType::from_name(n)),
        }
    }

    /// Whether this exception would be caught by `except <name>:`.
    ///
    /// Matching walks the class itself, then its ancestry, then the built-in
    /// hierarchy: a clause naming any transitive base catches the exception.
    #[must_use]
    pub fn matches_name(&self, handler_name: &str) -> bool {
        match &self.class {
            ExcClass::Builtin(t) => ExcType::from_name(handler_name).is_some_and(|h| t.is_subclass_of(h)),
            ExcClass::User { name, ancestry } => {
                if name == handler_name || ancestry.iter().any(|a| a == handler_name) {
                    return true;
                }
                // A user class deriving ValueError is caught by `except Exception:`
                // through the built-in hierarchy.
                match (self.exc_type(), ExcType::from_name(handler_name)) {
                    (Some(t), Some(h)) => t.is_subclass_of(h),
                    _ => false,
                }
            }
        }
    }

    /// The Python-style string form, `"ClassName: message"`, or just the class
    /// name when there is no message.
    #[must_use]
    pub fn py_string(&self) -> String {
        if self.message.is_empty() {
            self.class.name().to_string()
        } else {
            format!("{}: {}", self.class.name(), self.message)
        }
    }
}

impl fmt::Display for PyExc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.py_string())?;
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

/// Shorthand constructors for the messages the evaluator produces most.
///
/// Message text matches CPython because these strings are the primary
/// self-repair signal for the machine-generated programs the sandbox runs.
impl PyExc {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcType::TypeError, message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExcType::ValueError, message)
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::new(ExcType::NameError, format!("name '{name}' is not defined"))
    }

    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExcType::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub(crate) fn index_error() -> Self {
        Self::new(ExcType::IndexError, "list index out of range")
    }

    pub(crate) fn key_error(key_repr: &str) -> Self {
        Self::new(ExcType::KeyError, key_repr.to_string())
    }

    pub(crate) fn zero_division(message: &str) -> Self {
        Self::new(ExcType::ZeroDivisionError, message.to_string())
    }

    pub(crate) fn unsupported_binop(op_symbol: &str, left: &str, right: &str) -> Self {
        Self::type_error(format!(
            "unsupported operand type(s) for {op_symbol}: '{left}' and '{right}'"
        ))
    }

    pub(crate) fn not_callable(type_name: &str) -> Self {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    pub(crate) fn not_iterable(type_name: &str) -> Self {
        Self::type_error(format!("'{type_name}' object is not iterable"))
    }

    pub(crate) fn arg_count(name: &str, expected: usize, given: usize) -> Self {
        Self::type_error(format!(
            "{name}() takes {expected} positional argument{} but {given} {} given",
            if expected == 1 { "" } else { "s" },
            if given == 1 { "was" } else { "were" },
        ))
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::uncatchable(ExcType::RuntimeError, format!("internal error: {}", detail.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subclass_hierarchy() {
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::FileNotFoundError.is_subclass_of(ExcType::OSError));
        assert!(!ExcType::KeyError.is_subclass_of(ExcType::IndexError));
        assert!(ExcType::GeneratorExit.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::GeneratorExit.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn display_round_trip() {
        assert_eq!(ExcType::ValueError.to_string(), "ValueError");
        assert_eq!("TypeError".parse::<ExcType>().unwrap(), ExcType::TypeError);
        assert_eq!(ExcType::JSONDecodeError.to_string(), "JSONDecodeError");
    }

    #[test]
    fn ioerror_alias() {
        let exc = PyExc::new(ExcType::FileNotFoundError, "missing");
        assert!(exc.matches_name("IOError"));
        assert!(exc.matches_name("OSError"));
    }

    #[test]
    fn user_class_matching() {
        let exc = PyExc {
            class: ExcClass::User {
                name: "AppError".to_string(),
                ancestry: vec!["ValueError".to_string()],
            },
            message: "bad".to_string(),
            line: None,
            catchable: true,
        };
        assert!(exc.matches_name("AppError"));
        assert!(exc.matches_name("ValueError"));
        assert!(exc.matches_name("Exception"));
        assert!(!exc.matches_name("KeyError"));
        assert_eq!(exc.py_string(), "AppError: bad");
    }
}
