// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction failures into miette diagnostics.
//!
//! Unknown keys get a "did you mean" hint (Jaro-Winkler via `strsim`) and,
//! when the offending file is known, a labelled span pointing at the key.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity a valid key must reach before it is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration problem, renderable with miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(docket::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted in this section.
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(docket::config::invalid_value), help("expected {expected}"))]
    InvalidValue {
        /// Dotted path, e.g. `queue.max_pending`.
        key: String,
        found: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(docket::config::missing_key),
        help("set `{key}` in docket.toml or via the matching DOCKET_* variable")
    )]
    MissingKey { key: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(docket::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(docket::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// A TOML file that fed the figment, kept for span lookup.
struct SourceFile<'a> {
    name: &'a str,
    content: &'a str,
}

impl<'a> SourceFile<'a> {
    /// Locate `key` inside `[section]` (or the top level when `section` is
    /// `None`), tracking table headers line by line.
    fn locate(&self, section: Option<&str>, key: &str) -> Option<SourceSpan> {
        let mut current: Option<&str> = None;
        let mut offset = 0usize;
        for line in self.content.split_inclusive('\n') {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                current = Some(header.trim());
            } else if current == section {
                let indent = line.len() - line.trim_start().len();
                let rest = &line[indent..];
                if rest
                    .strip_prefix(key)
                    .is_some_and(|after| after.trim_start().starts_with('='))
                {
                    return Some(SourceSpan::new((offset + indent).into(), key.len()));
                }
            }
            offset += line.len();
        }
        None
    }

    fn named(&self) -> NamedSource<String> {
        NamedSource::new(self.name, self.content.to_string())
    }
}

/// Find the source file an error came from and the span of `key` within it.
fn span_for(
    error: &figment::Error,
    section: Option<&str>,
    key: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error.metadata.as_ref().and_then(|m| match m.source.as_ref() {
        Some(figment::Source::File(path)) => Some(path.display().to_string()),
        _ => None,
    });
    // Inline sources carry no file metadata; fall back to a lone source.
    let file = match origin {
        Some(path) => sources.iter().find(|(name, _)| *name == path),
        None if sources.len() == 1 => sources.first(),
        None => None,
    };
    let Some((name, content)) = file else {
        return (None, None);
    };
    let file = SourceFile { name, content };
    match file.locate(section, key) {
        Some(span) => (Some(span), Some(file.named())),
        None => (None, None),
    }
}

/// Convert every error carried by a `figment::Error` into a [`ConfigError`].
///
/// `sources` pairs a display name with the TOML text it was read from.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) =
                        span_for(&error, path.first().map(String::as_str), field, sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => {
                    let mut key = path.clone();
                    key.push(field.to_string());
                    ConfigError::MissingKey { key: key.join(".") }
                }
                Kind::InvalidType(found, expected) => {
                    let (section, field) = match path.as_slice() {
                        [section, .., field] => (Some(section.as_str()), field.as_str()),
                        [field] => (None, field.as_str()),
                        [] => (None, ""),
                    };
                    let (span, src) = span_for(&error, section, field, sources);
                    ConfigError::InvalidValue {
                        key: path.join("."),
                        found: found.to_string(),
                        expected: expected.clone(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr with miette's graphical renderer.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
