//! Host-facing structured errors.
//!
//! User code only ever observes Python-style exception messages; the [`Error`]
//! type here is what the embedding host receives, tagged with a [`ErrorKind`]
//! it can dispatch on (for example mapping `Timeout` to HTTP 504).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exc::{ExcType, PyExc};

/// Classification of a failure for host dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Lexer or parser failure; no recovery is attempted.
    Syntax,
    /// An uncaught Python runtime exception.
    Runtime,
    /// The compute budget was exhausted.
    Timeout,
    /// Module resolution failed.
    Import,
    /// A capability-backed I/O operation failed and was not caught.
    Io,
    /// No route in the table matched a dispatched request.
    RouteNotFound,
    /// An interpreter invariant was violated; indicates a bug, should be logged.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
            Self::Import => "import",
            Self::Io => "io",
            Self::RouteNotFound => "route-not-found",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A structured error surfaced to the host.
///
/// Carries the Python-style message (e.g. `"TypeError: unsupported operand
/// type(s) for +: 'int' and 'str'"`), the kind tag, and the source line where
/// the failure originated when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    /// Failure classification for host dispatch.
    pub kind: ErrorKind,
    /// The Python-style message, without any line suffix.
    pub message: String,
    /// Source line of the failure, when known.
    pub line: Option<u32>,
    /// The built-in exception type behind a runtime error, when there is one.
    pub exc_type: Option<ExcType>,
}

impl Error {
    /// Creates an error with an explicit kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            exc_type: None,
        }
    }

    /// Creates a syntax error at a line.
    #[must_use]
    pub fn syntax(message: impl Into<String>, line: u32) -> Self {
        Self {
            kind: ErrorKind::Syntax,
            message: message.into(),
            line: Some(line),
            exc_type: None,
        }
    }

    /// Classifies a raw runtime message by its `"ClassName: …"` prefix and
    /// extracts an optional `"on line N"` suffix into the line field.
    ///
    /// This is the entry point for messages produced by the runtime; the
    /// message prefix is the single source of truth for the kind tag.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let (message, line) = split_line_suffix(raw);
        let exc_type = message.split(':').next().and_then(ExcType::from_name);
        let kind = match exc_type {
            Some(ExcType::TimeoutError) => ErrorKind::Timeout,
            Some(ExcType::ImportError | ExcType::ModuleNotFoundError) => ErrorKind::Import,
            Some(ExcType::SyntaxError | ExcType::IndentationError) => ErrorKind::Syntax,
            Some(t) if t.is_subclass_of(ExcType::OSError) => ErrorKind::Io,
            Some(_) => ErrorKind::Runtime,
            None => ErrorKind::Runtime,
        };
        Self {
            kind,
            message: message.to_string(),
            line,
            exc_type,
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
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<PyExc> for Error {
    fn from(exc: PyExc) -> Self {
        let kind = if !exc.catchable && exc.exc_type() == Some(ExcType::TimeoutError) {
            ErrorKind::Timeout
        } else if !exc.catchable {
            ErrorKind::Internal
        } else {
            match exc.exc_type() {
                Some(ExcType::ImportError | ExcType::ModuleNotFoundError) => ErrorKind::Import,
                Some(t) if t.is_subclass_of(ExcType::OSError) => ErrorKind::Io,
                _ => ErrorKind::Runtime,
            }
        };
        Self {
            kind,
            message: exc.py_string(),
            line: exc.line,
            exc_type: exc.exc_type(),
        }
    }
}

/// Splits a trailing `" on line N"` suffix off a raw message.
fn split_line_suffix(raw: &str) -> (&str, Option<u32>) {
    if let Some(idx) = raw.rfind(" on line ") {
        let digits = &raw[idx + " on line ".len()..];
        if let Ok(line) = digits.parse::<u32>() {
            return (&raw[..idx], Some(line));
        }
    }
    (raw, None)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn classify_prefix() {
        let err = Error::classify("TypeError: bad operand");
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.exc_type, Some(ExcType::TypeError));

        let err = Error::classify("FileNotFoundError: no such file: 'a.txt'");
        assert_eq!(err.kind, ErrorKind::Io);

        let err = Error::classify("ModuleNotFoundError: No module named 'x'");
        assert_eq!(err.kind, ErrorKind::Import);

        let err = Error::classify("TimeoutError: compute budget exhausted");
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[test]
    fn classify_line_suffix() {
        let err = Error::classify("ValueError: bad value on line 17");
        assert_eq!(err.message, "ValueError: bad value");
        assert_eq!(err.line, Some(17));

        // A message ending in non-numeric text keeps its full form.
        let err = Error::classify("ValueError: broken on line x");
        assert_eq!(err.message, "ValueError: broken on line x");
        assert_eq!(err.line, None);
    }

    #[test]
    fn unknown_prefix_is_runtime() {
        let err = Error::classify("SomethingWeird: boom");
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.exc_type, None);
    }
}
