use std::fmt::Debug;

use serde::Serialize;

use crate::span::Span;


/// A formulac error. Used internally, exposed as formulac::ErrorMessage.
#[derive(Debug, Clone)]
pub struct Error {
    /// Message kind. Currently only Error is produced.
    pub kind: MessageKind,
    pub span: Option<Span>,
    pub reason: Reason,
    pub hints: Vec<String>,
    /// Machine readable identifier error code eg, "E0201"
    pub code: Option<&'static str>,
    /// Compiler stage that raised the error.
    pub source: ErrorSource,
    /// The field formula that was being compiled, if known.
    pub origin: Option<FormulaOrigin>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ErrorSource {
    Parser,
    Optimizer,
    Forker,
    Sanitizer,
    Translator,
    #[default]
    Unknown,
}

/// Identifies the formula an error is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormulaOrigin {
    pub alias: Option<String>,
    pub field_id: Option<String>,
}

/// Multiple formulac errors. Used internally, exposed as formulac::ErrorMessages.
#[derive(Debug, Clone)]
pub struct Errors(pub Vec<Error>);

/// Compile message kind. Currently only Error is implemented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Error,
    Warning,
    Lint,
}

#[derive(Debug, Clone)]
pub enum Reason {
    Simple(String),
    Expected {
        who: Option<String>,
        expected: String,
        found: String,
    },
    Unexpected {
        found: String,
    },
    NotFound {
        name: String,
        namespace: String,
    },
    /// A fork joining condition names a field that the consuming query cannot see.
    UnresolvedForkReference {
        name: String,
        query_id: String,
    },
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    UnsupportedCast {
        native_type: String,
        dialect: String,
    },
    Bug {
        details: Option<String>,
    },
}

/// Coarse classification of errors, for callers that only need to branch on
/// the kind of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    Parse,
    Translation,
    UnresolvedForkReference,
    ArityOrShape,
    Internal,
    Other,
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error {
            kind: MessageKind::Error,
            span: None,
            reason,
            hints: Vec::new(),
            code: None,
            source: ErrorSource::default(),
            origin: None,
        }
    }

    pub fn new_simple<S: ToString>(reason: S) -> Self {
        Error::new(Reason::Simple(reason.to_string()))
    }

    /// Used for things that you *think* should never happen, but are not sure.
    pub fn new_assert<S: ToString>(details: S) -> Self {
        Error::new(Reason::Bug {
            details: Some(details.to_string()),
        })
    }

    pub fn class(&self) -> ErrorClass {
        match &self.reason {
            Reason::UnresolvedForkReference { .. } => ErrorClass::UnresolvedForkReference,
            Reason::Arity { .. } => ErrorClass::ArityOrShape,
            Reason::Bug { .. } => ErrorClass::Internal,
            _ => match self.source {
                ErrorSource::Parser => ErrorClass::Parse,
                ErrorSource::Translator => ErrorClass::Translation,
                _ => ErrorClass::Other,
            },
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::Simple(text) => f.write_str(text),
            Reason::Expected {
                who,
                expected,
                found,
            } => {
                if let Some(who) = who {
                    write!(f, "{who} ")?;
                }
                write!(f, "expected {expected}, but found {found}")
            }
            Reason::Unexpected { found } => write!(f, "unexpected {found}"),
            Reason::NotFound { name, namespace } => write!(f, "{namespace} `{name}` not found"),
            Reason::UnresolvedForkReference { name, query_id } => write!(
                f,
                "fork references `{name}`, which is not available in query `{query_id}`"
            ),
            Reason::Arity {
                function,
                expected,
                found,
            } => write!(
                f,
                "function `{function}` expects {expected} arguments, but got {found}"
            ),
            Reason::UnsupportedCast {
                native_type,
                dialect,
            } => write!(f, "cannot cast to native type `{native_type}` on {dialect}"),
            Reason::Bug { details } => {
                write!(f, "internal compiler error")?;
                if let Some(details) = details {
                    write!(f, "; {details}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<Error> for Errors {
    fn from(error: Error) -> Self {
        Errors(vec![error])
    }
}

// Needed for anyhow
impl std::error::Error for Error {}

// Needed for anyhow
impl std::error::Error for Errors {}

// Needed for StdError
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self, f)
    }
}

// Needed for StdError
impl std::fmt::Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self, f)
    }
}

pub trait WithErrorInfo: Sized {
    fn push_hint<S: Into<String>>(self, hint: S) -> Self;

    fn with_hints<S: Into<String>, I: IntoIterator<Item = S>>(self, hints: I) -> Self;

    fn with_span(self, span: Option<Span>) -> Self;

    fn with_span_fallback(self, span: Option<Span>) -> Self;

    fn with_code(self, code: &'static str) -> Self;

    fn with_source(self, source: ErrorSource) -> Self;

    /// Attaches the formula origin, unless one was attached earlier.
    fn with_origin(self, origin: FormulaOrigin) -> Self;
}

impl WithErrorInfo for Error {
    fn push_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.hints.push(hint.into());
        self
    }

    fn with_hints<S: Into<String>, I: IntoIterator<Item = S>>(mut self, hints: I) -> Self {
        self.hints = hints.into_iter().map(|x| x.into()).collect();
        self
    }

    fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    fn with_span_fallback(mut self, span: Option<Span>) -> Self {
        self.span = self.span.or(span);
        self
    }

    fn with_source(mut self, source: ErrorSource) -> Self {
        if self.source == ErrorSource::Unknown {
            self.source = source;
        }
        self
    }

    fn with_origin(mut self, origin: FormulaOrigin) -> Self {
        self.origin = self.origin.or(Some(origin));
        self
    }
}

impl WithErrorInfo for Errors {
    fn push_hint<S: Into<String>>(mut self, hint: S) -> Self {
        let hint = hint.into();
        self.0 = self.0.into_iter().map(|e| e.push_hint(hint.clone())).collect();
        self
    }

    fn with_hints<S: Into<String>, I: IntoIterator<Item = S>>(mut self, hints: I) -> Self {
        let hints: Vec<String> = hints.into_iter().map(|x| x.into()).collect();
        self.0 = self.0.into_iter().map(|e| e.with_hints(hints.clone())).collect();
        self
    }

    fn with_span(mut self, span: Option<Span>) -> Self {
        self.0 = self.0.into_iter().map(|e| e.with_span(span)).collect();
        self
    }

    fn with_span_fallback(mut self, span: Option<Span>) -> Self {
        self.0 = self.0.into_iter().map(|e| e.with_span_fallback(span)).collect();
        self
    }

    fn with_code(mut self, code: &'static str) -> Self {
        self.0 = self.0.into_iter().map(|e| e.with_code(code)).collect();
        self
    }

    fn with_source(mut self, source: ErrorSource) -> Self {
        self.0 = self.0.into_iter().map(|e| e.with_source(source.clone())).collect();
        self
    }

    fn with_origin(mut self, origin: FormulaOrigin) -> Self {
        self.0 = self.0.into_iter().map(|e| e.with_origin(origin.clone())).collect();
        self
    }
}

impl<T, E: WithErrorInfo> WithErrorInfo for Result<T, E> {
    fn push_hint<S: Into<String>>(self, hint: S) -> Self {
        self.map_err(|e| e.push_hint(hint))
    }

    fn with_hints<S: Into<String>, I: IntoIterator<Item = S>>(self, hints: I) -> Self {
        self.map_err(|e| e.with_hints(hints))
    }

    fn with_span(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span(span))
    }

    fn with_span_fallback(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span_fallback(span))
    }

    fn with_code(self, code: &'static str) -> Self {
        self.map_err(|e| e.with_code(code))
    }

    fn with_source(self, source: ErrorSource) -> Self {
        self.map_err(|e| e.with_source(source))
    }

    fn with_origin(self, origin: FormulaOrigin) -> Self {
        self.map_err(|e| e.with_origin(origin))
    }
}
