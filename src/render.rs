//! The render entry point: one case in, one filled consent PDF out.
//!
//! [`Renderer::render`] wires every component together: classify once,
//! resolve each semantic field through its candidate paths, normalise the
//! date fields, run the signature chain once, then hand a fully resolved
//! [`RenderRequest`] to the CPU-bound composition step inside
//! `spawn_blocking`.
//!
//! ## Failure semantics
//!
//! A missing base template is the only fatal error — there is no sensible
//! default consent page. Every other missing input (record, field,
//! signature, uploaded document) degrades: the value is simply omitted
//! from the page and noted in [`RenderResult::omissions`] so callers can
//! flag the output for review.
//!
//! ## Idempotence
//!
//! Renders are stateless; with [`crate::RenderConfig::today`] frozen, an
//! identical request produces byte-identical output. The today line is the
//! only wall-clock-dependent value.

use crate::classify::{Classification, ProcessClassifier};
use crate::config::RenderConfig;
use crate::dates::{normalize_date, spelled_month, DateParts};
use crate::error::RenderError;
use crate::layout::{self, LayoutRegistry, Variant};
use crate::pipeline::overlay::{jpeg_for_embedding, overlay_first_page, DrawOp};
use crate::pipeline::{assemble, template};
use crate::resolve::{
    resolve_field, resolve_field_or_extract, resolve_flag, ExtractKind, FieldPath, ProcessRecord,
};
use crate::signature::{SignatureAsset, SignatureResolver};
use crate::store::{FileStore, RecordStore};
use chrono::{Datelike, NaiveDate};
use lopdf::Document;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything the composition step needs, fully resolved.
///
/// Ephemeral: constructed and consumed within a single render call.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub case_id: String,
    pub variant: Variant,
    /// Resolved text values keyed by layout slot name.
    pub values: BTreeMap<&'static str, String>,
    /// Resolved date fields keyed by layout slot name.
    pub dates: BTreeMap<&'static str, DateParts>,
    /// Checkbox states in layout order.
    pub checkboxes: Vec<(&'static str, bool)>,
    /// Free-text detail for the "other" checkbox.
    pub other_text: String,
    pub signature: SignatureAsset,
    /// Blank template bytes for the variant.
    pub template: Vec<u8>,
    /// Uploaded complete document, when one with more than one page exists.
    pub attachment: Option<Vec<u8>>,
    /// The (possibly frozen) date for the today line.
    pub today: NaiveDate,
}

/// A finished render.
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// The final serialized PDF.
    pub pdf: Vec<u8>,
    pub page_count: usize,
    /// Human-readable notes for every degraded input: unresolved fields,
    /// a failed signature chain, a dropped attachment. Empty means the
    /// form is fully populated.
    pub omissions: Vec<String>,
}

/// Orchestrates classification, resolution, and PDF composition.
///
/// Stateless across renders; all fields are read-only after construction,
/// so one `Renderer` serves concurrent renders without locking.
pub struct Renderer {
    config: RenderConfig,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileStore>,
    signatures: SignatureResolver,
    registry: LayoutRegistry,
    classifier: ProcessClassifier,
}

impl Renderer {
    pub fn new(
        config: RenderConfig,
        records: Arc<dyn RecordStore>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        let signatures = SignatureResolver::standard(
            Arc::clone(&files),
            config.local_signature_root.clone(),
            config.asset_base_url.clone(),
            config.strategy_timeout,
        );
        let classifier = ProcessClassifier::new(config.classification.clone());
        Self {
            config,
            records,
            files,
            signatures,
            registry: LayoutRegistry::default(),
            classifier,
        }
    }

    /// Replace the signature chain (tests, bespoke deployments).
    pub fn with_signature_resolver(mut self, resolver: SignatureResolver) -> Self {
        self.signatures = resolver;
        self
    }

    /// Classify a case id without rendering.
    pub fn classify(&self, case_id: &str) -> Classification {
        self.classifier.classify(case_id, None)
    }

    /// Render the consent PDF for a case.
    ///
    /// # Errors
    /// Only template problems are fatal ([`RenderError::TemplateMissing`] /
    /// [`RenderError::TemplateInvalid`]). All other missing inputs degrade
    /// and are listed in [`RenderResult::omissions`].
    pub async fn render(
        &self,
        case_id: &str,
        variant_override: Option<Variant>,
    ) -> Result<RenderResult, RenderError> {
        let start = Instant::now();
        let mut omissions = Vec::new();

        // ── Step 1: Classify ─────────────────────────────────────────────
        let classification = self.classifier.classify(case_id, variant_override);
        let variant = classification.variant;
        info!(case_id, category = %classification.category, variant = %variant, "render started");

        // ── Step 2: Fetch the case record ────────────────────────────────
        let record = match self.records.get_record(case_id).await {
            Some(record) => record,
            None => {
                warn!(case_id, "no case record; rendering an empty form");
                omissions.push(format!("case record '{case_id}' not found"));
                ProcessRecord::empty()
            }
        };

        // ── Step 3: Load the blank template (fatal on failure) ───────────
        let template = template::load_template(&self.config, variant).await?;

        // ── Step 4: Fetch the uploaded complete document, if any ─────────
        let attachment = self.fetch_attachment(&record, &mut omissions).await;

        // ── Step 5: Resolve fields, dates, checkboxes ────────────────────
        let ocr_text = resolve_field(&record, OCR_TEXT_PATHS);
        let ocr_text = (!ocr_text.is_empty()).then_some(ocr_text);
        let (values, dates) = resolve_plan(&record, variant, ocr_text.as_deref());
        let checkboxes: Vec<(&'static str, bool)> = CHECKBOX_PLAN
            .iter()
            .map(|&(slot, paths)| (slot, resolve_flag(&record, paths)))
            .collect();
        let other_text = resolve_field(&record, OTHER_TEXT_PATHS);

        // ── Step 6: Resolve the signature (never fatal) ──────────────────
        let signature = self.signatures.resolve(case_id, &record).await;
        if signature.image().is_none() {
            omissions.push("signature unresolved; area left blank".into());
        }

        // ── Step 7: Compose ──────────────────────────────────────────────
        let request = RenderRequest {
            case_id: case_id.to_string(),
            variant,
            values,
            dates,
            checkboxes,
            other_text,
            signature,
            template,
            attachment,
            today: self.today(),
        };
        let mut result = self.render_request(request).await?;

        omissions.extend(result.omissions);
        result.omissions = omissions;
        info!(
            case_id,
            pages = result.page_count,
            omissions = result.omissions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "render complete"
        );
        Ok(result)
    }

    /// Compose a fully resolved request into the final PDF.
    ///
    /// CPU-bound lopdf work, run inside `spawn_blocking`.
    pub async fn render_request(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let registry = self.registry.clone();
        let font_size = self.config.font_size;
        tokio::task::spawn_blocking(move || compose(request, &registry, font_size))
            .await
            .map_err(|e| RenderError::Internal(format!("compose task panicked: {e}")))?
    }

    /// The uploaded complete document, when the record references one with
    /// more than one page. Fetch and parse failures degrade to `None`.
    async fn fetch_attachment(
        &self,
        record: &ProcessRecord,
        omissions: &mut Vec<String>,
    ) -> Option<Vec<u8>> {
        let reference = resolve_field(record, COMPLETE_DOC_PATHS);
        if reference.is_empty() {
            return None;
        }
        let bytes = match self.files.fetch_bytes(&reference).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(reference, error = %e, "uploaded document fetch failed");
                omissions.push(format!("uploaded document '{reference}' unavailable"));
                return None;
            }
        };
        match template::page_count(&bytes) {
            Ok(n) if n > 1 => {
                debug!(reference, pages = n, "using uploaded complete document");
                Some(bytes)
            }
            Ok(_) => {
                // One page is not a "complete" document; the blank
                // template alone covers it.
                debug!(reference, "uploaded document has a single page; ignored");
                None
            }
            Err(e) => {
                warn!(reference, error = %e, "uploaded document unparseable");
                omissions.push(format!("uploaded document '{reference}' unparseable"));
                None
            }
        }
    }

    fn today(&self) -> NaiveDate {
        self.config
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Compose the final document: overlay page 1, carry attachment pages.
fn compose(
    request: RenderRequest,
    registry: &LayoutRegistry,
    font_size: f32,
) -> Result<RenderResult, RenderError> {
    let variant = request.variant;
    let mut omissions = Vec::new();

    let mut doc = Document::load_mem(&request.template).map_err(|e| {
        RenderError::TemplateInvalid {
            variant,
            detail: e.to_string(),
        }
    })?;

    let mut ops: Vec<DrawOp> = Vec::new();

    // Text fields. An anchor miss is silent by contract; an empty value
    // at a real anchor is a degradation worth noting.
    for (slot, value) in &request.values {
        let Some(anchor) = registry.anchor(variant, slot) else {
            continue;
        };
        if value.is_empty() {
            omissions.push(format!("field '{slot}' unresolved"));
            continue;
        }
        ops.push(DrawOp::Text {
            x: anchor.x,
            y: anchor.y,
            text: value.clone(),
            size: None,
        });
    }

    // Date triples.
    for (slot, parts) in &request.dates {
        let Some(anchors) = registry.date_anchors(variant, slot) else {
            continue;
        };
        if parts.is_empty() {
            omissions.push(format!("date '{slot}' unresolved"));
            continue;
        }
        for (anchor, text) in [
            (anchors.day, &parts.day),
            (anchors.month, &parts.month),
            (anchors.year, &parts.year),
        ] {
            ops.push(DrawOp::Text {
                x: anchor.x,
                y: anchor.y,
                text: text.clone(),
                size: None,
            });
        }
    }

    // Today line: day box plus spelled month, no year.
    let today = registry.today(variant);
    ops.push(DrawOp::Text {
        x: today.day.x,
        y: today.day.y,
        text: format!("{:02}", request.today.day()),
        size: None,
    });
    ops.push(DrawOp::Text {
        x: today.month.x,
        y: today.month.y,
        text: spelled_month(request.today.month()).to_string(),
        size: None,
    });

    // Checkbox marks, plus the free-text detail when "other" is set.
    for (slot, checked) in &request.checkboxes {
        if !checked {
            continue;
        }
        if let Some(anchor) = registry.checkbox(variant, slot) {
            ops.push(DrawOp::Text {
                x: anchor.x,
                y: anchor.y,
                text: "X".to_string(),
                size: Some(font_size + 1.0),
            });
        }
        if *slot == layout::CB_OTHER && !request.other_text.is_empty() {
            let anchor = registry.other_text(variant);
            ops.push(DrawOp::Text {
                x: anchor.x,
                y: anchor.y,
                text: request.other_text.clone(),
                size: None,
            });
        }
    }

    // Signature image: fixed height, width from the source aspect ratio.
    if let Some(img) = request.signature.image() {
        match jpeg_for_embedding(img) {
            Ok((jpeg, px_width, px_height)) => {
                let anchor = registry.signature(variant);
                let aspect = px_width as f32 / px_height.max(1) as f32;
                ops.push(DrawOp::Image {
                    x: anchor.x,
                    y: anchor.y,
                    width: anchor.height * aspect,
                    height: anchor.height,
                    jpeg,
                    px_width,
                    px_height,
                });
            }
            Err(e) => {
                warn!(error = %e, "signature embedding failed; area left blank");
                omissions.push("signature undrawable; area left blank".into());
            }
        }
    }

    overlay_first_page(&mut doc, &ops, font_size)?;

    if let Some(attachment) = &request.attachment {
        match assemble::append_attachment_pages(&mut doc, attachment) {
            Ok(carried) => debug!(carried, "attachment pages carried through"),
            Err(e) => {
                warn!(error = %e, "attachment merge failed; consent page only");
                omissions.push("uploaded document pages dropped".into());
            }
        }
    }

    let page_count = doc.get_pages().len();
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf)
        .map_err(|e| RenderError::Assembly(format!("serialize: {e}")))?;

    Ok(RenderResult {
        pdf,
        page_count,
        omissions,
    })
}

// ── Field plans ──────────────────────────────────────────────────────────
//
// Candidate paths reflect every shape the extraction side has produced so
// far: top-level, under `extracted`, and the minor/guardian nested pair.
// Order encodes precedence; do not reorder without checking live records.

const OCR_TEXT_PATHS: FieldPath = &["texto_ocr", "extracted.texto_bruto", "ocr.texto"];

const COMPLETE_DOC_PATHS: FieldPath = &[
    "documento_completo",
    "ficheiros.documento_completo",
    "uploads.documento_completo",
];

const OTHER_TEXT_PATHS: FieldPath =
    &["consentimentos.outro_detalhe", "consentimentos.outro_texto"];

const CHECKBOX_PLAN: &[(&str, FieldPath)] = &[
    (
        layout::CB_NOTIFY_EMAIL,
        &["consentimentos.notificacao_email", "consentimentos.email"],
    ),
    (
        layout::CB_NOTIFY_POST,
        &["consentimentos.notificacao_postal", "consentimentos.correio"],
    ),
    (
        layout::CB_DATA_PROCESSING,
        &["consentimentos.tratamento_dados", "consentimentos.dados"],
    ),
    (layout::CB_OTHER, &["consentimentos.outro"]),
];

struct FieldSpec {
    slot: &'static str,
    paths: FieldPath,
    extract: Option<ExtractKind>,
}

struct DateSpec {
    slot: &'static str,
    paths: FieldPath,
    extract: Option<ExtractKind>,
}

const ADULT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        slot: layout::SUBJECT_NAME,
        paths: &[
            "nome_completo",
            "extracted.nome_completo",
            "dados_pessoais.nome_completo",
        ],
        extract: None,
    },
    FieldSpec {
        slot: layout::SUBJECT_DOCUMENT,
        paths: &[
            "numero_documento",
            "extracted.numero_documento",
            "documento.numero",
        ],
        extract: Some(ExtractKind::DocumentNumber),
    },
];

const ADULT_DATES: &[DateSpec] = &[DateSpec {
    slot: layout::SUBJECT_VALIDITY,
    paths: &[
        "validade_documento",
        "extracted.validade_documento",
        "documento.validade",
    ],
    extract: Some(ExtractKind::ValidityDate),
}];

const MINOR_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        slot: layout::SUBJECT_NAME,
        paths: &[
            "dados_do_menor.nome_completo",
            "nome_completo",
            "extracted.nome_completo",
        ],
        extract: None,
    },
    FieldSpec {
        slot: layout::GUARDIAN_NAME,
        paths: &[
            "dados_do_responsavel.nome_do_responsavel",
            "dados_do_responsavel.nome_completo",
            "responsavel.nome_completo",
        ],
        extract: None,
    },
    FieldSpec {
        slot: layout::SUBJECT_DOCUMENT,
        paths: &[
            "dados_do_menor.numero_documento",
            "numero_documento",
            "extracted.numero_documento",
        ],
        extract: Some(ExtractKind::DocumentNumber),
    },
    FieldSpec {
        slot: layout::GUARDIAN_DOCUMENT,
        paths: &[
            "dados_do_responsavel.numero_documento",
            "responsavel.numero_documento",
        ],
        extract: None,
    },
    FieldSpec {
        slot: layout::NATIONALITY,
        paths: &[
            "dados_do_menor.nacionalidade",
            "nacionalidade",
            "extracted.nacionalidade",
        ],
        extract: None,
    },
];

const MINOR_DATES: &[DateSpec] = &[
    DateSpec {
        slot: layout::SUBJECT_VALIDITY,
        paths: &[
            "dados_do_menor.validade_documento",
            "validade_documento",
            "extracted.validade_documento",
        ],
        extract: Some(ExtractKind::ValidityDate),
    },
    DateSpec {
        slot: layout::GUARDIAN_VALIDITY,
        paths: &[
            "dados_do_responsavel.validade_documento",
            "responsavel.validade_documento",
        ],
        extract: None,
    },
];

/// Run the variant's field plan against a record.
fn resolve_plan(
    record: &ProcessRecord,
    variant: Variant,
    ocr_text: Option<&str>,
) -> (BTreeMap<&'static str, String>, BTreeMap<&'static str, DateParts>) {
    let (fields, date_specs) = match variant {
        Variant::Adult => (ADULT_FIELDS, ADULT_DATES),
        Variant::Minor => (MINOR_FIELDS, MINOR_DATES),
    };

    let mut values = BTreeMap::new();
    for spec in fields {
        let value = match spec.extract {
            Some(kind) => resolve_field_or_extract(record, spec.paths, kind, ocr_text),
            None => resolve_field(record, spec.paths),
        };
        values.insert(spec.slot, value);
    }

    let mut dates = BTreeMap::new();
    for spec in date_specs {
        let raw = match spec.extract {
            Some(kind) => resolve_field_or_extract(record, spec.paths, kind, ocr_text),
            None => resolve_field(record, spec.paths),
        };
        dates.insert(spec.slot, normalize_date(&raw));
    }

    (values, dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minor_plan_reads_the_nested_pair() {
        let record = ProcessRecord::new(json!({
            "dados_do_menor": {
                "nome_completo": "Ana Silva",
                "numero_documento": "P1234567",
            },
            "dados_do_responsavel": {
                "nome_do_responsavel": "João Silva",
                "validade_documento": "05/03/2030",
            },
        }));
        let (values, dates) = resolve_plan(&record, Variant::Minor, None);
        assert_eq!(values[layout::SUBJECT_NAME], "Ana Silva");
        assert_eq!(values[layout::GUARDIAN_NAME], "João Silva");
        assert_eq!(values[layout::SUBJECT_DOCUMENT], "P1234567");
        assert_eq!(dates[layout::GUARDIAN_VALIDITY].year, "2030");
        assert!(dates[layout::SUBJECT_VALIDITY].is_empty());
    }

    #[test]
    fn adult_plan_extracts_from_ocr_when_paths_miss() {
        let record = ProcessRecord::new(json!({ "nome_completo": "Rui Costa" }));
        let ocr = "CARTAO DE CIDADAO 12345678 valido ate 01/02/2031";
        let (values, dates) = resolve_plan(&record, Variant::Adult, Some(ocr));
        assert_eq!(values[layout::SUBJECT_DOCUMENT], "12345678");
        assert_eq!(dates[layout::SUBJECT_VALIDITY].year, "2031");
    }

    #[test]
    fn empty_record_resolves_everything_to_blank() {
        let (values, dates) = resolve_plan(&ProcessRecord::empty(), Variant::Minor, None);
        assert!(values.values().all(String::is_empty));
        assert!(dates.values().all(DateParts::is_empty));
    }
}
