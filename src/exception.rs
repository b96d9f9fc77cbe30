//! Exception sink shared by every dispatch entry point.
//!
//! Nothing in the option engine unwinds for a recoverable problem. Bad
//! arguments, unbalanced brackets and collaborator failures are *reported*
//! here and the pipeline moves on to the next option. The caller decides when
//! to surface the accumulated list (after each top-level option, at the end
//! of the run, ...).
//!
//! The sink is append-only: entries leave it only through
//! [`ExceptionSink::drain`], never by being overwritten.

use crate::color::ColorError;
use crate::geometry::GeometryError;
use crate::imaging::BackendError;
use crate::keywords::KeywordError;
use crate::properties::PropertyError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// How bad a reported problem is.
///
/// Ordered so that the worst severity of a run is simply the `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// The reportable problem codes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExceptionKind {
    #[error("parenthesis nested too deeply")]
    ParenthesisNestedTooDeeply,
    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,
    #[error("unable to clone image")]
    UnableToCloneImage,
    #[error("no such image `{0}`")]
    NoSuchImage(String),
    #[error("no images defined")]
    NoImagesDefined,
    #[error("invalid argument `{0}`")]
    InvalidArgument(String),
    #[error("missing argument")]
    MissingArgument,
    #[error("unrecognized option")]
    UnrecognizedOption,
    #[error("invalid geometry `{0}`")]
    InvalidGeometry(String),
    #[error("unrecognized color `{0}`")]
    UnrecognizedColor(String),
    #[error("unrecognized {kind} type `{value}`")]
    UnrecognizedKeyword { kind: &'static str, value: String },
    #[error("missing null image separator")]
    MissingNullSeparator,
    #[error("second image operand missing")]
    MissingImageOperand,
    #[error("unable to read image `{path}`: {reason}")]
    UnableToReadImage { path: String, reason: String },
    #[error("unable to write image `{path}`: {reason}")]
    UnableToWriteImage { path: String, reason: String },
    #[error("{0}")]
    Collaborator(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl ExceptionKind {
    /// Default severity for the code.
    pub fn severity(&self) -> Severity {
        match self {
            ExceptionKind::ResourceExhausted(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl From<BackendError> for ExceptionKind {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ResourceExhausted(what) => ExceptionKind::ResourceExhausted(what),
            other => ExceptionKind::Collaborator(other.to_string()),
        }
    }
}

impl From<GeometryError> for ExceptionKind {
    fn from(err: GeometryError) -> Self {
        match err {
            GeometryError::Invalid(text) => ExceptionKind::InvalidGeometry(text),
            GeometryError::InvalidScenes(text) => ExceptionKind::InvalidArgument(text),
        }
    }
}

impl From<ColorError> for ExceptionKind {
    fn from(err: ColorError) -> Self {
        let ColorError::Unrecognized(text) = err;
        ExceptionKind::UnrecognizedColor(text)
    }
}

impl From<KeywordError> for ExceptionKind {
    fn from(err: KeywordError) -> Self {
        ExceptionKind::UnrecognizedKeyword {
            kind: err.kind,
            value: err.value,
        }
    }
}

impl From<PropertyError> for ExceptionKind {
    fn from(err: PropertyError) -> Self {
        match err {
            PropertyError::Read { path, source } => ExceptionKind::UnableToReadImage {
                path,
                reason: source.to_string(),
            },
        }
    }
}

/// One reported problem, tagged with the option that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub severity: Severity,
    pub kind: ExceptionKind,
    pub option: String,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} `{}'", self.severity, self.kind, self.option)
    }
}

/// Ordered, append-only collection of exceptions.
#[derive(Debug, Default)]
pub struct ExceptionSink {
    entries: Vec<Exception>,
}

impl ExceptionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a problem with the kind's default severity.
    pub fn report(&mut self, kind: ExceptionKind, option: &str) {
        let severity = kind.severity();
        self.report_with(severity, kind, option);
    }

    pub fn report_with(&mut self, severity: Severity, kind: ExceptionKind, option: &str) {
        tracing::debug!(%severity, option, "{kind}");
        self.entries.push(Exception {
            severity,
            kind,
            option: option.to_string(),
        });
    }

    pub fn entries(&self) -> &[Exception] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Worst severity reported so far.
    pub fn severity(&self) -> Option<Severity> {
        self.entries.iter().map(|e| e.severity).max()
    }

    /// Remove and return everything reported so far, in report order.
    pub fn drain(&mut self) -> Vec<Exception> {
        std::mem::take(&mut self.entries)
    }
}

/// A sink that is either owned by the wand or lent to it by the caller.
///
/// A lent sink outlives the wand: dropping the wand only detaches from it.
#[derive(Debug)]
pub enum SinkHandle {
    Owned(ExceptionSink),
    Shared(Rc<RefCell<ExceptionSink>>),
}

impl SinkHandle {
    pub fn report(&mut self, kind: ExceptionKind, option: &str) {
        match self {
            SinkHandle::Owned(sink) => sink.report(kind, option),
            SinkHandle::Shared(sink) => sink.borrow_mut().report(kind, option),
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            SinkHandle::Owned(sink) => sink.severity(),
            SinkHandle::Shared(sink) => sink.borrow().severity(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SinkHandle::Owned(sink) => sink.len(),
            SinkHandle::Shared(sink) => sink.borrow().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current entries.
    pub fn entries(&self) -> Vec<Exception> {
        match self {
            SinkHandle::Owned(sink) => sink.entries().to_vec(),
            SinkHandle::Shared(sink) => sink.borrow().entries().to_vec(),
        }
    }

    pub fn drain(&mut self) -> Vec<Exception> {
        match self {
            SinkHandle::Owned(sink) => sink.drain(),
            SinkHandle::Shared(sink) => sink.borrow_mut().drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn report_keeps_order_and_worst_severity() {
        let mut sink = ExceptionSink::new();
        sink.report(ExceptionKind::Collaborator("blur failed".into()), "-blur");
        sink.report(ExceptionKind::UnbalancedParenthesis, ")");
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.entries()[0].option, "-blur");
        assert_eq!(sink.entries()[1].kind, ExceptionKind::UnbalancedParenthesis);
        assert_eq!(sink.severity(), Some(Severity::Error));
    }

    #[test]
    fn drain_empties_the_sink() {
        let mut sink = ExceptionSink::new();
        sink.report(ExceptionKind::MissingArgument, "-resize");
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
        assert_eq!(sink.severity(), None);
    }

    #[test]
    fn shared_sink_survives_handle() {
        let shared = Rc::new(RefCell::new(ExceptionSink::new()));
        {
            let mut handle = SinkHandle::Shared(Rc::clone(&shared));
            handle.report(ExceptionKind::UnableToCloneImage, "-clone");
        }
        assert_eq!(shared.borrow().len(), 1);
    }

    #[test]
    fn backend_resource_errors_are_fatal() {
        let kind: ExceptionKind = BackendError::ResourceExhausted("pixel cache".into()).into();
        assert_eq!(kind.severity(), Severity::Fatal);
        let kind: ExceptionKind = BackendError::Unsupported("fft".into()).into();
        assert_eq!(kind.severity(), Severity::Error);
    }

    #[test]
    fn argument_errors_convert() {
        let kind: ExceptionKind = GeometryError::Invalid("1x?".into()).into();
        assert_eq!(kind, ExceptionKind::InvalidGeometry("1x?".into()));
        let kind: ExceptionKind = ColorError::Unrecognized("bleu".into()).into();
        assert_eq!(kind, ExceptionKind::UnrecognizedColor("bleu".into()));
        let kind: ExceptionKind = "sideways".parse::<crate::keywords::Gravity>().unwrap_err().into();
        assert_eq!(kind.to_string(), "unrecognized gravity type `sideways`");
    }

    #[test]
    fn display_names_the_option() {
        let e = Exception {
            severity: Severity::Error,
            kind: ExceptionKind::NoSuchImage("7".into()),
            option: "-swap".into(),
        };
        assert_eq!(e.to_string(), "error: no such image `7` `-swap'");
    }
}
