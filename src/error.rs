// ABOUTME: Error and control-flow signal types for the Lunite pipeline

use crate::token::Location;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// The closed set of error kinds surfaced verbatim in messages (spec 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Runtime,
    Assignment,
    Index,
    Key,
    Member,
    Method,
    Function,
    Class,
    Loop,
    Import,
    Destructuring,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Runtime => "Runtime",
            ErrorKind::Assignment => "Assignment",
            ErrorKind::Index => "Index",
            ErrorKind::Key => "Key",
            ErrorKind::Member => "Member",
            ErrorKind::Method => "Method",
            ErrorKind::Function => "Function",
            ErrorKind::Class => "Class",
            ErrorKind::Loop => "Loop",
            ErrorKind::Import => "Import",
            ErrorKind::Destructuring => "Destructuring",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{}", s)
    }
}

/// A located, kinded error (spec 7): `{ kind, message, file, line, column }`.
///
/// Built unlocated (`line`/`column` zero, `file` empty) at the point of
/// detection; the nearest enclosing AST-walking frame attaches a location via
/// `locate()`, which is a no-op once already located -- this is spec 7's
/// "attached the first time the error crosses a located node".
#[derive(Debug, Clone, Error)]
pub struct LuniteError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    located: bool,
}

impl fmt::Display for LuniteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.located {
            write!(
                f,
                "{}: {} ({}:{}:{})",
                self.kind, self.message, self.file, self.line, self.column
            )
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl LuniteError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        LuniteError {
            kind,
            message: message.into(),
            file: String::new(),
            line: 0,
            column: 0,
            located: false,
        }
    }

    /// Already-located constructor, used by the lexer/parser which always
    /// know their current position.
    fn new_at(kind: ErrorKind, message: impl Into<String>, loc: Location) -> Self {
        LuniteError {
            kind,
            message: message.into(),
            file: String::new(),
            line: loc.line,
            column: loc.col,
            located: true,
        }
    }

    pub fn syntax(message: impl Into<String>, loc: Location) -> Self {
        Self::new_at(ErrorKind::Syntax, message, loc)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn assignment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assignment, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key, message)
    }

    pub fn member(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Member, message)
    }

    pub fn method(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Method, message)
    }

    pub fn function(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Function, message)
    }

    pub fn class(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Class, message)
    }

    pub fn loop_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Loop, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Import, message)
    }

    pub fn destructuring(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Destructuring, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn locate(mut self, file: &str, loc: Location) -> Self {
        if !self.located {
            self.file = file.to_string();
            self.line = loc.line;
            self.column = loc.col;
            self.located = true;
        }
        self
    }

    pub fn is_located(&self) -> bool {
        self.located
    }
}

/// A non-local jump target (spec 3.3 `LeapStmt`): a label name or a source
/// line number.
#[derive(Debug, Clone, PartialEq)]
pub enum LeapTarget {
    Label(String),
    Line(i64),
}

/// Typed unwinds (spec 9), not exceptions-as-values. `attempt/rescue` catches
/// only `Err`; every other catch site re-raises everything it doesn't own
/// (spec 7: control-flow signals are "not user-catchable").
#[derive(Debug, Clone)]
pub enum Signal {
    Err(LuniteError),
    Return(Value),
    Break,
    Advance,
    Leap(LeapTarget),
}

impl From<LuniteError> for Signal {
    fn from(e: LuniteError) -> Self {
        Signal::Err(e)
    }
}

pub type EvalResult = Result<Value, Signal>;

/// Attaches a source location to a carried `LuniteError`, leaving control-flow
/// signals and already-located errors untouched.
pub fn locate_result(result: EvalResult, file: &str, loc: Location) -> EvalResult {
    result.map_err(|sig| match sig {
        Signal::Err(e) => Signal::Err(e.locate(file, loc)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocated_display_has_no_position() {
        let e = LuniteError::runtime("boom");
        assert_eq!(format!("{}", e), "Runtime: boom");
    }

    #[test]
    fn locate_attaches_once() {
        let e = LuniteError::runtime("boom").locate("a.luna", Location::new(3, 4));
        assert_eq!(format!("{}", e), "Runtime: boom (a.luna:3:4)");

        let e2 = e.locate("b.luna", Location::new(9, 9));
        assert_eq!(format!("{}", e2), "Runtime: boom (a.luna:3:4)");
    }

    #[test]
    fn locate_result_skips_control_signals() {
        let result: EvalResult = Err(Signal::Break);
        let located = locate_result(result, "f.luna", Location::new(1, 1));
        assert!(matches!(located, Err(Signal::Break)));
    }

    #[test]
    fn const_reassignment_message_contains_constant() {
        let e = LuniteError::runtime("cannot reassign constant 'x'");
        assert!(format!("{}", e).contains("constant"));
    }
}
