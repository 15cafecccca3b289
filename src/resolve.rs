//! Field resolution: pull one semantic value out of an inconsistent record.
//!
//! Records arrive from the OCR/LLM extraction side with no stable shape:
//! the same field may live at the top level, under an `extracted`
//! sub-object, or inside a type-specific nested object (`dados_do_menor`,
//! `dados_do_responsavel`). Rather than spreading untyped traversal across
//! the codebase, all of it is contained here behind one contract:
//!
//! * candidate paths are tried **in order** and the first defined,
//!   non-blank value wins;
//! * resolution is **total** — an unresolved field is `""`, never an error.
//!
//! When no path matches, a known extractable field kind can fall back to a
//! regex scan over the raw OCR text bucket. That is deliberately a last
//! resort: raw text is noisy, but a plausible document number beats an
//! empty box on a consent form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

/// One case record, as handed over by the extraction side.
///
/// A thin newtype over [`serde_json::Value`] so the "anything goes" shape
/// risk stays local to this module.
#[derive(Debug, Clone, Default)]
pub struct ProcessRecord(Value);

impl ProcessRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A record with no data at all. Resolution over it yields `""` for
    /// every path, which renders an empty (but valid) form.
    pub fn empty() -> Self {
        Self(Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Descend a single dotted path, short-circuiting on any missing key.
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for key in path.split('.') {
            cur = cur.as_object()?.get(key)?;
        }
        Some(cur)
    }
}

impl From<Value> for ProcessRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// An ordered list of dotted candidate paths for one semantic field.
///
/// Owned by call-site configuration (the render plan), immutable.
pub type FieldPath = &'static [&'static str];

/// Field kinds with a defined raw-text extraction fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractKind {
    /// 6–10 char uppercase alphanumeric with at least one digit;
    /// first match wins.
    DocumentNumber,
    /// `DD/MM/YYYY`; the **last** match wins, because validity dates
    /// typically appear after issue dates in document text.
    ValidityDate,
}

/// Resolve one semantic field by walking candidate paths in order.
///
/// Returns the first defined, non-blank value; numbers are stringified.
/// Total: an empty record or an all-miss path list yields `""`.
pub fn resolve_field(record: &ProcessRecord, paths: FieldPath) -> String {
    for path in paths {
        if let Some(value) = record.lookup(path) {
            if let Some(s) = present_string(value) {
                trace!(path, value = %s, "field resolved");
                return s;
            }
        }
    }
    String::new()
}

/// [`resolve_field`], then a raw-text regex fallback for extractable kinds.
///
/// `ocr_text` is the concatenated raw text of every scanned document on the
/// case; pass `None` when the case has no raw bucket.
pub fn resolve_field_or_extract(
    record: &ProcessRecord,
    paths: FieldPath,
    kind: ExtractKind,
    ocr_text: Option<&str>,
) -> String {
    let value = resolve_field(record, paths);
    if !value.is_empty() {
        return value;
    }
    let Some(text) = ocr_text else {
        return String::new();
    };
    match kind {
        ExtractKind::DocumentNumber => extract_document_number(text),
        ExtractKind::ValidityDate => extract_validity_date(text),
    }
    .unwrap_or_default()
}

/// Resolve a checkbox flag: the first path holding any defined value
/// decides, truthy meaning `true`, `"true"`, `"sim"`, `"x"`, `"1"`.
///
/// The extraction side writes whatever the source form suggested — real
/// booleans, `"Sim"`, a literal `"X"` copied from the scanned box.
pub fn resolve_flag(record: &ProcessRecord, paths: FieldPath) -> bool {
    for path in paths {
        if let Some(value) = record.lookup(path) {
            match value {
                Value::Bool(b) => return *b,
                Value::String(s) => {
                    return matches!(
                        s.trim().to_lowercase().as_str(),
                        "true" | "sim" | "x" | "1" | "yes"
                    )
                }
                Value::Number(n) => return n.as_i64() == Some(1),
                _ => continue,
            }
        }
    }
    false
}

/// A value counts as present when it is a non-blank string or a number.
fn present_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

static RE_DOC_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z0-9]{6,10}\b").expect("static regex"));

static RE_SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("static regex"));

/// First 6–10 char alphanumeric run that contains at least one digit.
///
/// The digit requirement filters out uppercase words (headers, surnames)
/// that happen to be 6–10 letters long.
fn extract_document_number(text: &str) -> Option<String> {
    RE_DOC_NUMBER
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|s| s.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Last `DD/MM/YYYY` in the text.
fn extract_validity_date(text: &str) -> Option<String> {
    RE_SLASH_DATE
        .find_iter(text)
        .last()
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> ProcessRecord {
        ProcessRecord::new(v)
    }

    const NAME_PATHS: FieldPath = &[
        "nome_completo",
        "extracted.nome_completo",
        "dados_do_menor.nome_completo",
    ];

    #[test]
    fn earlier_path_wins_when_both_resolve() {
        let r = record(json!({
            "nome_completo": "Maria Direta",
            "extracted": { "nome_completo": "Maria Extraida" },
        }));
        assert_eq!(resolve_field(&r, NAME_PATHS), "Maria Direta");
    }

    #[test]
    fn falls_through_blank_and_missing_values() {
        let r = record(json!({
            "nome_completo": "   ",
            "extracted": { "nome_completo": "Maria Extraida" },
        }));
        assert_eq!(resolve_field(&r, NAME_PATHS), "Maria Extraida");
    }

    #[test]
    fn descends_nested_objects() {
        let r = record(json!({
            "dados_do_menor": { "nome_completo": "Ana Silva" },
        }));
        assert_eq!(resolve_field(&r, NAME_PATHS), "Ana Silva");
    }

    #[test]
    fn total_on_empty_record() {
        assert_eq!(resolve_field(&ProcessRecord::empty(), NAME_PATHS), "");
        assert_eq!(resolve_field(&record(json!({})), NAME_PATHS), "");
        // Path through a non-object never panics either.
        let r = record(json!({ "extracted": 42 }));
        assert_eq!(resolve_field(&r, NAME_PATHS), "");
    }

    #[test]
    fn numbers_are_stringified() {
        let r = record(json!({ "numero_documento": 3081542 }));
        assert_eq!(resolve_field(&r, &["numero_documento"]), "3081542");
    }

    #[test]
    fn doc_number_fallback_takes_first_match_with_digit() {
        let text = "REPUBLICA PORTUGUESA\nPASSAPORTE N2843761 outro A12345";
        let got = resolve_field_or_extract(
            &ProcessRecord::empty(),
            &["numero_documento"],
            ExtractKind::DocumentNumber,
            Some(text),
        );
        // "REPUBLICA" is 9 chars but has no digit; skipped.
        assert_eq!(got, "N2843761");
    }

    #[test]
    fn validity_fallback_prefers_the_last_date() {
        let text = "Emitido em 02/01/2020 valido ate 02/01/2030";
        let got = resolve_field_or_extract(
            &ProcessRecord::empty(),
            &["validade_documento"],
            ExtractKind::ValidityDate,
            Some(text),
        );
        assert_eq!(got, "02/01/2030");
    }

    #[test]
    fn path_value_beats_fallback() {
        let r = record(json!({ "numero_documento": "X99" }));
        let got = resolve_field_or_extract(
            &r,
            &["numero_documento"],
            ExtractKind::DocumentNumber,
            Some("FALLBK1234"),
        );
        assert_eq!(got, "X99");
    }

    #[test]
    fn flags_accept_booleans_and_form_markers() {
        let r = record(json!({
            "consentimentos": { "email": true, "correio": "Sim", "dados": "X", "outro": "não" },
        }));
        assert!(resolve_flag(&r, &["consentimentos.email"]));
        assert!(resolve_flag(&r, &["consentimentos.correio"]));
        assert!(resolve_flag(&r, &["consentimentos.dados"]));
        assert!(!resolve_flag(&r, &["consentimentos.outro"]));
        assert!(!resolve_flag(&r, &["consentimentos.inexistente"]));
        assert!(!resolve_flag(&ProcessRecord::empty(), &["a.b"]));
    }

    #[test]
    fn no_fallback_text_means_empty() {
        let got = resolve_field_or_extract(
            &ProcessRecord::empty(),
            &["numero_documento"],
            ExtractKind::DocumentNumber,
            None,
        );
        assert_eq!(got, "");
    }
}
