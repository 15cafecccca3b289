//! Template loading and validation.
//!
//! The blank consent template is the one input a render cannot do without,
//! so this is the only module whose failures are fatal. Validation happens
//! at load time — magic bytes first, then a full lopdf parse — so a broken
//! deployment surfaces as [`RenderError::TemplateInvalid`] with the
//! variant named, rather than as an opaque draw failure later.

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::layout::Variant;
use lopdf::Document;
use tracing::debug;

/// Load and validate the blank template for a variant.
///
/// In-memory bytes (tests, previews) win over the configured path. A
/// missing source or an unreadable file is [`RenderError::TemplateMissing`];
/// bytes that are not a parseable PDF are [`RenderError::TemplateInvalid`].
pub async fn load_template(config: &RenderConfig, variant: Variant) -> Result<Vec<u8>, RenderError> {
    if let Some(bytes) = config.template_bytes(variant) {
        validate(bytes, variant, "<in-memory template>")?;
        return Ok(bytes.to_vec());
    }

    let Some(path) = config.template_path(variant) else {
        return Err(RenderError::TemplateMissing {
            variant,
            path: None,
        });
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| RenderError::TemplateMissing {
            variant,
            path: Some(path.clone()),
        })?;

    validate(&bytes, variant, &path.display().to_string())?;
    debug!(variant = %variant, path = %path.display(), bytes = bytes.len(), "template loaded");
    Ok(bytes)
}

fn validate(bytes: &[u8], variant: Variant, source: &str) -> Result<(), RenderError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(RenderError::TemplateInvalid {
            variant,
            detail: format!(
                "'{source}' does not start with %PDF (first bytes: {:?})",
                &bytes[..bytes.len().min(4)]
            ),
        });
    }
    Document::load_mem(bytes).map_err(|e| RenderError::TemplateInvalid {
        variant,
        detail: format!("'{source}': {e}"),
    })?;
    Ok(())
}

/// Page count of an in-memory PDF.
///
/// Used to decide whether an uploaded document is "complete" (more than
/// one page). Parse failures are the caller's to absorb — an unreadable
/// upload just means falling back to the blank template.
pub fn page_count(pdf: &[u8]) -> Result<usize, lopdf::Error> {
    Ok(Document::load_mem(pdf)?.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};

    fn one_page_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn bytes_win_and_validate() {
        let config = RenderConfig::builder()
            .adult_template_bytes(one_page_pdf())
            .build()
            .unwrap();
        let bytes = load_template(&config, Variant::Adult).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn missing_variant_template_is_fatal() {
        let config = RenderConfig::builder()
            .adult_template_bytes(one_page_pdf())
            .build()
            .unwrap();
        assert!(matches!(
            load_template(&config, Variant::Minor).await,
            Err(RenderError::TemplateMissing { variant: Variant::Minor, .. })
        ));
    }

    #[tokio::test]
    async fn garbage_bytes_are_invalid_not_missing() {
        let config = RenderConfig::builder()
            .minor_template_bytes(b"not a pdf at all".to_vec())
            .build()
            .unwrap();
        assert!(matches!(
            load_template(&config, Variant::Minor).await,
            Err(RenderError::TemplateInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_path_is_missing() {
        let config = RenderConfig::builder()
            .adult_template_path("/nonexistent/adult.pdf")
            .build()
            .unwrap();
        assert!(matches!(
            load_template(&config, Variant::Adult).await,
            Err(RenderError::TemplateMissing { .. })
        ));
    }

    #[test]
    fn page_count_counts() {
        assert_eq!(page_count(&one_page_pdf()).unwrap(), 1);
        assert!(page_count(b"junk").is_err());
    }
}
