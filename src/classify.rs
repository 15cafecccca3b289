//! Case classification: derive category and layout variant from a case id.
//!
//! Case ids arrive as `<Category>-<opaque-suffix>` (e.g.
//! `CPLPMenor-kx1a2b-9f3c`). Only the leading category token matters for
//! layout selection; the suffix is an opaque upload id. Classification is a
//! pure function of the category, so identical categories with different
//! suffixes always produce the same variant — route handlers rely on that
//! to cache per-category template choices.
//!
//! ## Why default to adult?
//!
//! The minor layout draws guardian fields that simply do not exist on an
//! adult record. Rendering an adult case through the minor layout produces
//! a form with garbage in legally meaningful positions, while the reverse
//! merely leaves the guardian line blank. Unknown categories therefore
//! fail open to the adult layout.

use crate::layout::Variant;
use serde::Serialize;
use std::collections::BTreeSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Result of classifying a case id.
///
/// Serializable as-is for route handlers that report the chosen variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Normalized category token (diacritics stripped, lowercased,
    /// separators removed), e.g. `cplpmenor`.
    pub category: String,
    /// Layout variant the renderer must use.
    pub variant: Variant,
}

/// Immutable category lookup tables, injected at construction.
///
/// These used to be scattered runtime globals in earlier revisions; keeping
/// them in one injected struct lets tests swap the sets and keeps
/// classification table-driven.
#[derive(Debug, Clone)]
pub struct ClassificationTables {
    /// Categories that are definitely adult, checked first.
    pub adult: BTreeSet<&'static str>,
    /// Categories handled by the student rule: adult unless a minor or
    /// secondary-school marker also appears in the token.
    pub student_prefixes: Vec<&'static str>,
    /// Closed set of known minor categories (exact match after folding).
    pub minor: BTreeSet<&'static str>,
    /// Substrings that mark a minor case in an otherwise unknown category.
    pub minor_markers: Vec<&'static str>,
}

impl Default for ClassificationTables {
    fn default() -> Self {
        Self {
            adult: BTreeSet::from([
                "renovacao",
                "concessao",
                "cplp",
                "cplpadulto",
                "visto",
                "manifestacao",
            ]),
            student_prefixes: vec!["estudante", "estudo"],
            minor: BTreeSet::from([
                "cplpmenor",
                "menor",
                "reagrupamentomenor",
                "estudantemenor",
                "estudantesecundario",
            ]),
            minor_markers: vec!["menor", "secundario", "tutor"],
        }
    }
}

/// Classifies case ids into a category token and a rendering variant.
#[derive(Debug, Clone, Default)]
pub struct ProcessClassifier {
    tables: ClassificationTables,
}

impl ProcessClassifier {
    pub fn new(tables: ClassificationTables) -> Self {
        Self { tables }
    }

    /// Classify a case id, optionally forced by an explicit override.
    ///
    /// Pure and total: never errors, never panics. Decision order:
    ///
    /// 1. explicit adult categories short-circuit to adult;
    /// 2. student categories default to adult unless the token also carries
    ///    a minor/secondary marker;
    /// 3. exact membership in the closed minor set;
    /// 4. substring scan for minor markers;
    /// 5. default adult (fail-open, see module docs).
    pub fn classify(&self, case_id: &str, override_variant: Option<Variant>) -> Classification {
        let category = fold_category(leading_token(case_id));

        if let Some(variant) = override_variant {
            return Classification { category, variant };
        }

        let variant = if self.tables.adult.contains(category.as_str()) {
            Variant::Adult
        } else if self
            .tables
            .student_prefixes
            .iter()
            .any(|p| category.starts_with(p))
        {
            if self
                .tables
                .minor_markers
                .iter()
                .any(|m| category.contains(m))
            {
                Variant::Minor
            } else {
                Variant::Adult
            }
        } else if self.tables.minor.contains(category.as_str()) {
            Variant::Minor
        } else if self
            .tables
            .minor_markers
            .iter()
            .any(|m| category.contains(m))
        {
            Variant::Minor
        } else {
            Variant::Adult
        };

        Classification { category, variant }
    }
}

/// The category is everything before the first `-`.
fn leading_token(case_id: &str) -> &str {
    case_id.split('-').next().unwrap_or(case_id)
}

/// Fold a category token: NFD, drop combining marks, lowercase, keep only
/// ASCII alphanumerics. `"Renovação_2"` → `"renovacao2"`.
fn fold_category(token: &str) -> String {
    token
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(case_id: &str) -> Classification {
        ProcessClassifier::default().classify(case_id, None)
    }

    #[test]
    fn category_folding_strips_diacritics_and_case() {
        assert_eq!(fold_category("Renovação"), "renovacao");
        assert_eq!(fold_category("CPLP_Menor"), "cplpmenor");
        assert_eq!(fold_category("Concessão"), "concessao");
    }

    #[test]
    fn suffix_never_changes_the_variant() {
        let a = classify("CPLPMenor-kx1a2b-9f3c");
        let b = classify("CPLPMenor-zz9y8x");
        let c = classify("CPLPMenor-");
        assert_eq!(a.variant, Variant::Minor);
        assert_eq!(a.variant, b.variant);
        assert_eq!(a.variant, c.variant);
    }

    #[test]
    fn explicit_adult_categories_win() {
        assert_eq!(classify("CPLP-a1").variant, Variant::Adult);
        assert_eq!(classify("Renovação-b2").variant, Variant::Adult);
        assert_eq!(classify("Concessão-c3").variant, Variant::Adult);
    }

    #[test]
    fn cplp_menor_is_minor_even_though_cplp_is_adult() {
        // "cplp" is in the adult set but only on exact match; the folded
        // token "cplpmenor" falls through to the minor set.
        assert_eq!(classify("CPLPMenor-x").variant, Variant::Minor);
    }

    #[test]
    fn students_default_adult_unless_qualified() {
        assert_eq!(classify("Estudante-u1").variant, Variant::Adult);
        assert_eq!(classify("EstudanteSuperior-u2").variant, Variant::Adult);
        assert_eq!(classify("EstudanteMenor-u3").variant, Variant::Minor);
        assert_eq!(classify("EstudanteSecundário-u4").variant, Variant::Minor);
    }

    #[test]
    fn keyword_scan_catches_unknown_minor_categories() {
        assert_eq!(classify("JuntaMenorIdade-77").variant, Variant::Minor);
        assert_eq!(classify("ComTutorLegal-5").variant, Variant::Minor);
    }

    #[test]
    fn unknown_categories_fail_open_to_adult() {
        assert_eq!(classify("QualquerCoisa-1").variant, Variant::Adult);
        assert_eq!(classify("").variant, Variant::Adult);
    }

    #[test]
    fn override_bypasses_the_tables() {
        let c = ProcessClassifier::default().classify("CPLPMenor-x", Some(Variant::Adult));
        assert_eq!(c.variant, Variant::Adult);
        assert_eq!(c.category, "cplpmenor");
    }
}
