//! Crate-wide error and diagnostic types.
//!
//! Most conditions this emitter can hit are *not* fatal: assembly keeps
//! going, the offending operation is skipped or defaulted, and a
//! [`Diagnostic`] is recorded. Only a handful of caller-invariant
//! violations surface as a hard [`Error`].

use core::fmt;
use core::result;

#[derive(Debug)]
pub enum Error {
    /// The input or a caller invariant was violated in a way that makes
    /// continuing unsafe (more than 255 sections, an unknown in-file
    /// section index during symbol definition, ...).
    Malformed(String),
    Scroll(scroll::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Malformed(ref msg) => write!(fmt, "malformed input: {}", msg),
            Error::Scroll(ref err) => write!(fmt, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Scroll(ref err) => Some(err),
            Error::Malformed(_) => None,
        }
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Severity of a condition, mirroring the three tiers the assembler
/// this core serves reports diagnostics at. `Fatal` conditions fail
/// only the one call that detected them, signaled through that
/// method's own return type (`bool`/`Option<_>`) rather than a
/// crate-wide `Result` — there's no mid-assembly unwind to perform,
/// the offending directive is just skipped. `Context::finalize` is the
/// exception: it returns `crate::error::Result` because a `scroll`
/// write failure there has no sensible defaulted output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Purely informational (e.g. an upgraded relocation kind).
    Warning,
    /// Input was accepted in a degraded form; the result may be
    /// malformed but emission continues.
    NonFatal,
    /// A caller invariant was violated in a way that makes continuing
    /// unsafe; the offending call fails outright.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, message: message.into() }
    }

    pub fn non_fatal(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::NonFatal, message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Fatal, message: message.into() }
    }
}
