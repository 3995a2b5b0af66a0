use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::io::stderr;

use anstream::adapter::strip_str;
use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::Serialize;

use crate::{DisplayOptions, Error, ErrorClass, ErrorSource, Errors, FormulaOrigin, MessageKind, Span};

#[derive(Clone, Serialize)]
pub struct ErrorMessage {
    /// Message kind. Currently only Error is implemented.
    pub kind: MessageKind,
    /// Machine-readable identifier of the error
    pub code: Option<String>,
    /// Plain text of the error
    pub reason: String,
    /// A list of suggestions of how to fix the error
    pub hints: Vec<String>,
    /// Character offset of error origin within the formula source
    pub span: Option<Span>,
    pub class: ErrorClass,
    /// Compiler stage that raised the error
    pub source: ErrorSource,
    /// The field formula the error is about
    pub origin: Option<FormulaOrigin>,
    /// Pretty text of the error, with hints and origin.
    pub display: Option<String>,
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(display) = &self.display {
            let trimmed = display
                .split('\n')
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n");
            return f.write_str(&trimmed);
        }

        let code = (self.code.as_ref())
            .map(|c| format!("[{c}] "))
            .unwrap_or_default();
        writeln!(f, "{code}Error: {}", &self.reason)?;
        if let Some(origin) = &self.origin {
            writeln!(f, "  in {}", describe_origin(origin))?;
        }
        for hint in &self.hints {
            writeln!(f, "↳ Hint: {hint}")?;
        }
        Ok(())
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self, f)
    }
}

fn describe_origin(origin: &FormulaOrigin) -> String {
    match (&origin.alias, &origin.field_id) {
        (Some(alias), Some(field_id)) => format!("formula `{alias}` of field `{field_id}`"),
        (Some(alias), None) => format!("formula `{alias}`"),
        (None, Some(field_id)) => format!("field `{field_id}`"),
        (None, None) => "an unknown formula".to_string(),
    }
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        log::debug!("{e:#?}");
        ErrorMessage {
            class: e.class(),
            code: e.code.map(str::to_string),
            kind: e.kind,
            reason: e.reason.to_string(),
            hints: e.hints,
            span: e.span,
            source: e.source,
            origin: e.origin,
            display: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}

impl StdError for ErrorMessages {}

impl From<Vec<ErrorMessage>> for ErrorMessages {
    fn from(errors: Vec<ErrorMessage>) -> Self {
        ErrorMessages { inner: errors }
    }
}

impl From<ErrorMessage> for ErrorMessages {
    fn from(e: ErrorMessage) -> Self {
        ErrorMessages { inner: vec![e] }
    }
}

impl From<Error> for ErrorMessages {
    fn from(e: Error) -> Self {
        ErrorMessages {
            inner: vec![ErrorMessage::from(e)],
        }
    }
}

impl From<Errors> for ErrorMessages {
    fn from(errs: Errors) -> Self {
        ErrorMessages {
            inner: errs.0.into_iter().map(ErrorMessage::from).collect(),
        }
    }
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for e in &self.inner {
            Display::fmt(&e, f)?;
        }
        Ok(())
    }
}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error": "{e}"}}"#))
    }

    /// Builds the pretty display of every message.
    pub fn composed(mut self, display: &DisplayOptions) -> Self {
        for e in &mut self.inner {
            e.display = e.compose_display().map(|text| match display {
                DisplayOptions::AnsiColor => maybe_strip_colors(&text),
                DisplayOptions::Plain => strip_str(&text).to_string(),
            });
        }
        self
    }

    pub fn first_class(&self) -> Option<ErrorClass> {
        self.inner.first().map(|e| e.class)
    }
}

impl ErrorMessage {
    /// Formulas carry no source text, so the report points at a description
    /// of the formula it is about, with each hint as a help line.
    fn compose_display(&self) -> Option<String> {
        // Colors are always on here and stripped later, if needed.
        let config = Config::default().with_color(true);

        let source_id = (self.origin.as_ref())
            .and_then(|o| o.alias.clone())
            .unwrap_or_else(|| "formula".to_string());
        let text = self.origin.as_ref().map(describe_origin).unwrap_or_default();
        let span = (source_id.clone(), 0..text.chars().count());

        let mut report = Report::build(ReportKind::Error, span.clone())
            .with_config(config)
            .with_message(&self.reason);
        if let Some(code) = &self.code {
            report = report.with_code(code);
        }
        if !text.is_empty() {
            report = report.with_label(Label::new(span));
        }
        for hint in &self.hints {
            report = report.with_help(hint);
        }

        let mut out = Vec::new();
        report
            .finish()
            .write((source_id, Source::from(text)), &mut out)
            .ok()?;
        String::from_utf8(out).ok()
    }
}

fn should_use_color() -> bool {
    match anstream::AutoStream::choice(&stderr()) {
        anstream::ColorChoice::Auto => true,
        anstream::ColorChoice::Always => true,
        anstream::ColorChoice::AlwaysAnsi => true,
        anstream::ColorChoice::Never => false,
    }
}

/// Strip colors, for insta snapshot tests and non-tty output. This will
/// respond to environment variables such as `CLI_COLOR`.
pub(crate) fn maybe_strip_colors(s: &str) -> String {
    if !should_use_color() {
        strip_str(s).to_string()
    } else {
        s.to_string()
    }
}
