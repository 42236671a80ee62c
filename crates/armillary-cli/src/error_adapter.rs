//! Error adapter for converting CliError to miette diagnostics.
//!
//! This module provides the bridge between the CLI's standard error type and
//! miette's rich diagnostic formatting. Every error gets a stable diagnostic
//! code; script parse errors also point at the offending span of the script.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, SourceSpan};

use armillary::ModelError;

use crate::{config::ConfigError, error::CliError};

/// Adapter rendering a [`CliError`] through miette.
pub struct ErrorAdapter<'a>(pub &'a CliError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            CliError::Io(_) => "armillary::io",
            CliError::Script { .. } => "armillary::script",
            CliError::Config(_) => "armillary::config",
            CliError::UnknownAlias(_) | CliError::DuplicateAlias(_) => "armillary::alias",
            CliError::UnsupportedValue { .. } => "armillary::value",
            CliError::Step { source, .. } => match source {
                ModelError::PreconditionFailed(_) => "armillary::precondition",
                ModelError::NotFound(_) => "armillary::not_found",
                ModelError::Integrity(_) => "armillary::integrity",
            },
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match &self.0 {
            CliError::UnknownAlias(_) => {
                "aliases are defined by earlier steps; `root` names the project"
            }
            CliError::Config(ConfigError::MissingFile(_)) => {
                "pass an existing file to --config or omit it to use the defaults"
            }
            CliError::Step {
                source: ModelError::PreconditionFailed(_),
                ..
            } => "the step was rejected before touching the model; run without --strict to skip it",
            CliError::Step {
                source: ModelError::Integrity(_),
                ..
            } => "the operation was rolled back; the model is unchanged",
            _ => return None,
        };
        Some(Box::new(help))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match &self.0 {
            CliError::Script { src, .. } => Some(src as &dyn miette::SourceCode),
            _ => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let CliError::Script { error, .. } = &self.0 else {
            return None;
        };
        let span = error.span()?;
        let span = SourceSpan::new(span.start.into(), span.len());
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            Some(error.message().to_string()),
            span,
        ))))
    }
}
