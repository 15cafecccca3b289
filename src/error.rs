//! Error types for the cplp-formfill library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RenderError`] — **Fatal**: the render cannot proceed at all. In this
//!   domain that means exactly one thing: the blank form template (or the
//!   assembled document built from it) is missing or unusable. That is a
//!   deployment defect worth surfacing, not a data problem.
//!
//! * [`FetchError`] — **Non-fatal**: a collaborator lookup failed (file
//!   store, HTTP asset, local scope). These are absorbed where they occur:
//!   a signature strategy that fails advances the chain, an uploaded
//!   document that cannot be fetched falls back to the blank template, and
//!   the render continues with the affected field simply left blank.
//!
//! The separation encodes the domain preference that a partially filled
//! consent document is still useful, while a missing template is a
//! configuration bug. Callers can distinguish the two: `Err(RenderError)`
//! means "show a configuration error", `Ok(result)` with a non-empty
//! [`crate::render::RenderResult::omissions`] means "show the document,
//! optionally flagged for review".

use crate::layout::Variant;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cplp-formfill library.
///
/// Field, date, signature, and upstream-fetch failures never appear here —
/// they degrade the render and are reported through
/// [`crate::render::RenderResult::omissions`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// No blank template is configured (or readable) for the variant.
    ///
    /// The consent page is always drawn from the blank template, so there
    /// is no sensible fallback.
    #[error("No form template available for the {variant} layout{}\nConfigure RenderConfig::{}_template before rendering.",
        path.as_ref().map(|p| format!(" (looked at '{}')", p.display())).unwrap_or_default(),
        variant.as_str())]
    TemplateMissing {
        variant: Variant,
        path: Option<PathBuf>,
    },

    /// The configured template exists but is not a parseable PDF.
    #[error("Form template for the {variant} layout is not a valid PDF: {detail}")]
    TemplateInvalid { variant: Variant, detail: String },

    /// Rebuilding the output document failed.
    ///
    /// Only reachable when the template itself is structurally unusable
    /// (no catalog, no Pages tree), so it shares the fatal path with
    /// [`RenderError::TemplateInvalid`].
    #[error("Failed to assemble output PDF: {0}")]
    Assembly(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal collaborator failure.
///
/// Returned by [`crate::store::FileStore`] implementations and signature
/// strategies. Always absorbed by the caller; carried in log output and
/// omission notes, never propagated out of a render.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The store has no entry for the requested path.
    #[error("not found: '{path}'")]
    NotFound { path: String },

    /// An HTTP fetch failed (non-2xx status or transport error).
    #[error("fetch failed for '{path}': {reason}")]
    Http { path: String, reason: String },

    /// A local read failed.
    #[error("read failed for '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The strategy's own deadline elapsed.
    #[error("timed out after {secs}s fetching '{path}'")]
    Timeout { path: String, secs: u64 },

    /// Bytes came back but could not be decoded as an image.
    #[error("undecodable image from '{path}': {reason}")]
    BadImage { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_missing_names_variant_and_path() {
        let e = RenderError::TemplateMissing {
            variant: Variant::Minor,
            path: Some(PathBuf::from("/srv/templates/minor.pdf")),
        };
        let msg = e.to_string();
        assert!(msg.contains("minor"), "got: {msg}");
        assert!(msg.contains("/srv/templates/minor.pdf"), "got: {msg}");
    }

    #[test]
    fn template_missing_without_path() {
        let e = RenderError::TemplateMissing {
            variant: Variant::Adult,
            path: None,
        };
        let msg = e.to_string();
        assert!(msg.contains("adult"), "got: {msg}");
        assert!(!msg.contains("looked at"), "got: {msg}");
    }

    #[test]
    fn fetch_timeout_display() {
        let e = FetchError::Timeout {
            path: "uploads/sig.png".into(),
            secs: 4,
        };
        assert!(e.to_string().contains("4s"));
        assert!(e.to_string().contains("uploads/sig.png"));
    }
}
