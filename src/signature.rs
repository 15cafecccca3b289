//! Signature resolution: turn a case's signature reference into image bytes.
//!
//! Signatures ended up in six different places across deployments: the
//! uploads bucket, inline data URIs written by the extraction side, a
//! scoped local directory on some installs, a preview field set by the
//! review UI, an older stored-file API with its own path convention, and
//! finally plain static assets. Earlier revisions duplicated the fallback
//! chain once per PDF variant; here it is a single ordered list of
//! capability-typed strategies evaluated by one loop.
//!
//! Chain semantics:
//! * strategies run **in order**; the first success wins and later
//!   strategies are never invoked;
//! * each strategy is isolated — a failure (or its per-strategy timeout)
//!   is logged and the chain advances;
//! * overall failure is the [`SignatureAsset::NotFound`] sentinel, never
//!   an error: the renderer leaves the signature area blank.

use crate::error::FetchError;
use crate::resolve::{resolve_field, FieldPath, ProcessRecord};
use crate::store::{FileStore, HttpFileStore};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Candidate locations of the uploaded-signature reference in a record.
const SIGNATURE_REF_PATHS: FieldPath = &[
    "assinatura",
    "extracted.assinatura",
    "ficheiros.assinatura",
    "signature_path",
];

/// Candidate locations of the preview/demo signature field.
const SIGNATURE_PREVIEW_PATHS: FieldPath = &["assinatura_preview", "preview.assinatura"];

/// Image format of a resolved signature, sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    Png,
    Jpeg,
}

/// A decoded signature image.
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub bytes: Vec<u8>,
    pub format: SignatureFormat,
    /// Natural pixel dimensions; the renderer derives the drawn width
    /// from these to preserve aspect ratio.
    pub width: u32,
    pub height: u32,
}

/// A resolved signature, or the explicit not-found sentinel.
#[derive(Debug, Clone)]
pub enum SignatureAsset {
    Found(SignatureImage),
    NotFound,
}

impl SignatureAsset {
    pub fn image(&self) -> Option<&SignatureImage> {
        match self {
            SignatureAsset::Found(img) => Some(img),
            SignatureAsset::NotFound => None,
        }
    }
}

/// One way of locating signature bytes.
///
/// `Ok(None)` means "not applicable for this record" (e.g. no inline data
/// URI present); `Err` means the strategy applied but failed. Both advance
/// the chain.
#[async_trait]
pub trait SignatureStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(
        &self,
        case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError>;
}

/// Ordered multi-strategy signature lookup.
pub struct SignatureResolver {
    strategies: Vec<Box<dyn SignatureStrategy>>,
    per_strategy_timeout: Duration,
}

impl SignatureResolver {
    pub fn new(strategies: Vec<Box<dyn SignatureStrategy>>, per_strategy_timeout: Duration) -> Self {
        Self {
            strategies,
            per_strategy_timeout,
        }
    }

    /// The production chain, in precedence order.
    ///
    /// `local_root` is only present on deployments with a scoped local
    /// store; `asset_base` is the static-asset origin for the last-resort
    /// strategy. Either being absent simply removes that rung.
    pub fn standard(
        files: Arc<dyn FileStore>,
        local_root: Option<PathBuf>,
        asset_base: Option<String>,
        per_strategy_timeout: Duration,
    ) -> Self {
        let mut strategies: Vec<Box<dyn SignatureStrategy>> = vec![
            Box::new(UploadedFileStrategy {
                files: Arc::clone(&files),
            }),
            Box::new(InlineDataUriStrategy),
            Box::new(LocalScopeStrategy { root: local_root }),
            Box::new(PreviewFieldStrategy),
            Box::new(AltFileApiStrategy { files }),
        ];
        if let Some(base) = asset_base {
            match HttpFileStore::new(base, per_strategy_timeout) {
                Ok(store) => strategies.push(Box::new(StaticAssetStrategy { store })),
                Err(e) => warn!("static-asset strategy disabled: {e}"),
            }
        }
        Self::new(strategies, per_strategy_timeout)
    }

    /// Walk the chain; first decodable image wins.
    ///
    /// Never errors. Each failed strategy is logged for diagnostics and
    /// the next one is tried; a fully exhausted chain returns
    /// [`SignatureAsset::NotFound`].
    pub async fn resolve(&self, case_id: &str, record: &ProcessRecord) -> SignatureAsset {
        for strategy in &self.strategies {
            let outcome = timeout(
                self.per_strategy_timeout,
                strategy.attempt(case_id, record),
            )
            .await;

            let bytes = match outcome {
                Err(_) => {
                    warn!(
                        strategy = strategy.name(),
                        secs = self.per_strategy_timeout.as_secs(),
                        "signature strategy timed out"
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    debug!(strategy = strategy.name(), error = %e, "signature strategy failed");
                    continue;
                }
                Ok(Ok(None)) => {
                    debug!(strategy = strategy.name(), "signature strategy not applicable");
                    continue;
                }
                Ok(Ok(Some(bytes))) => bytes,
            };

            match decode_image(&bytes) {
                Ok(img) => {
                    info!(
                        strategy = strategy.name(),
                        format = ?img.format,
                        width = img.width,
                        height = img.height,
                        "signature resolved"
                    );
                    return SignatureAsset::Found(img);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "signature bytes undecodable");
                    continue;
                }
            }
        }

        info!(case_id, "no signature resolved; area will be left blank");
        SignatureAsset::NotFound
    }
}

/// Sniff format from magic bytes and probe natural dimensions.
fn decode_image(bytes: &[u8]) -> Result<SignatureImage, FetchError> {
    let format = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        SignatureFormat::Png
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        SignatureFormat::Jpeg
    } else {
        return Err(FetchError::BadImage {
            path: "<signature bytes>".into(),
            reason: "neither PNG nor JPEG magic".into(),
        });
    };

    let decoded = image::load_from_memory(bytes).map_err(|e| FetchError::BadImage {
        path: "<signature bytes>".into(),
        reason: e.to_string(),
    })?;

    Ok(SignatureImage {
        bytes: bytes.to_vec(),
        format,
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// The record's signature reference, skipping inline data URIs (those
/// belong to [`InlineDataUriStrategy`]).
fn signature_reference(record: &ProcessRecord) -> Option<String> {
    let value = resolve_field(record, SIGNATURE_REF_PATHS);
    if value.is_empty() || value.starts_with("data:") {
        None
    } else {
        Some(value)
    }
}

/// Uploads live under `uploads/`; references sometimes carry a leading
/// slash or already include the prefix.
fn normalize_upload_path(reference: &str) -> String {
    let trimmed = reference.trim_start_matches('/');
    if trimmed.starts_with("uploads/") {
        trimmed.to_string()
    } else {
        format!("uploads/{trimmed}")
    }
}

// ── Strategy 1: registered file-serving collaborator ─────────────────────

struct UploadedFileStrategy {
    files: Arc<dyn FileStore>,
}

#[async_trait]
impl SignatureStrategy for UploadedFileStrategy {
    fn name(&self) -> &'static str {
        "uploaded-file"
    }

    async fn attempt(
        &self,
        _case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let Some(reference) = signature_reference(record) else {
            return Ok(None);
        };
        let path = normalize_upload_path(&reference);
        self.files.fetch_bytes(&path).await.map(Some)
    }
}

// ── Strategy 2: inline data URI on the record ────────────────────────────

struct InlineDataUriStrategy;

#[async_trait]
impl SignatureStrategy for InlineDataUriStrategy {
    fn name(&self) -> &'static str {
        "inline-data-uri"
    }

    async fn attempt(
        &self,
        _case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let value = resolve_field(record, SIGNATURE_REF_PATHS);
        if !value.starts_with("data:image/") {
            return Ok(None);
        }
        decode_data_uri(&value).map(Some)
    }
}

// ── Strategy 3: scoped local storage (some deployments only) ─────────────

struct LocalScopeStrategy {
    root: Option<PathBuf>,
}

#[async_trait]
impl SignatureStrategy for LocalScopeStrategy {
    fn name(&self) -> &'static str {
        "local-scope"
    }

    async fn attempt(
        &self,
        _case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let Some(reference) = signature_reference(record) else {
            return Ok(None);
        };
        let path = root.join(reference.trim_start_matches('/'));
        tokio::fs::read(&path).await.map(Some).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                FetchError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

// ── Strategy 4: preview/demo signature field ─────────────────────────────

struct PreviewFieldStrategy;

#[async_trait]
impl SignatureStrategy for PreviewFieldStrategy {
    fn name(&self) -> &'static str {
        "preview-field"
    }

    async fn attempt(
        &self,
        _case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let value = resolve_field(record, SIGNATURE_PREVIEW_PATHS);
        if value.is_empty() {
            return Ok(None);
        }
        if value.starts_with("data:image/") {
            return decode_data_uri(&value).map(Some);
        }
        // Preview fields written by the review UI are sometimes bare base64.
        STANDARD
            .decode(value.as_bytes())
            .map(Some)
            .map_err(|e| FetchError::BadImage {
                path: "assinatura_preview".into(),
                reason: e.to_string(),
            })
    }
}

// ── Strategy 5: alternate stored-file API ────────────────────────────────

/// The older file API keyed files by case id:
/// `files/<case-id>/<basename>`.
struct AltFileApiStrategy {
    files: Arc<dyn FileStore>,
}

#[async_trait]
impl SignatureStrategy for AltFileApiStrategy {
    fn name(&self) -> &'static str {
        "alt-file-api"
    }

    async fn attempt(
        &self,
        case_id: &str,
        record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let basename = signature_reference(record)
            .and_then(|r| r.rsplit('/').next().map(str::to_string))
            .unwrap_or_else(|| "assinatura.png".to_string());
        let path = format!("files/{case_id}/{basename}");
        self.files.fetch_bytes(&path).await.map(Some)
    }
}

// ── Strategy 6: direct static-asset URL ──────────────────────────────────

struct StaticAssetStrategy {
    store: HttpFileStore,
}

#[async_trait]
impl SignatureStrategy for StaticAssetStrategy {
    fn name(&self) -> &'static str {
        "static-asset"
    }

    async fn attempt(
        &self,
        case_id: &str,
        _record: &ProcessRecord,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let path = format!("static/signatures/{case_id}.png");
        self.store.fetch_bytes(&path).await.map(Some)
    }
}

/// Decode the base64 payload of a `data:image/...;base64,...` URI.
fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FetchError> {
    let payload = uri
        .split_once(";base64,")
        .map(|(_, b64)| b64)
        .ok_or_else(|| FetchError::BadImage {
            path: "<data uri>".into(),
            reason: "missing ';base64,' marker".into(),
        })?;
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| FetchError::BadImage {
            path: "<data uri>".into(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 1×1 PNG, the smallest valid signature fixture.
    pub(crate) fn tiny_png() -> Vec<u8> {
        use image::{ImageFormat, Rgba, RgbaImage};
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])))
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode fixture png");
        buf.into_inner()
    }

    struct Scripted {
        name: &'static str,
        outcome: Result<Option<Vec<u8>>, FetchError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SignatureStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            _case_id: &str,
            _record: &ProcessRecord,
        ) -> Result<Option<Vec<u8>>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn scripted(
        name: &'static str,
        outcome: Result<Option<Vec<u8>>, FetchError>,
    ) -> (Box<dyn SignatureStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                name,
                outcome,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn first_success_wins_and_later_strategies_never_run() {
        let (s1, c1) = scripted("one", Ok(Some(tiny_png())));
        let (s3, c3) = scripted("three", Ok(Some(tiny_png())));
        let resolver = SignatureResolver::new(vec![s1, s3], Duration::from_secs(1));

        let asset = resolver.resolve("Caso-1", &ProcessRecord::empty()).await;
        assert!(asset.image().is_some());
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 0, "later strategy was invoked");
    }

    #[tokio::test]
    async fn failures_advance_the_chain() {
        let (s1, _) = scripted(
            "one",
            Err(FetchError::NotFound {
                path: "x".into(),
            }),
        );
        let (s2, _) = scripted("two", Ok(None));
        let (s3, c3) = scripted("three", Ok(Some(tiny_png())));
        let resolver = SignatureResolver::new(vec![s1, s2, s3], Duration::from_secs(1));

        let asset = resolver.resolve("Caso-1", &ProcessRecord::empty()).await;
        assert!(asset.image().is_some());
        assert_eq!(c3.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_bytes_advance_the_chain() {
        let (s1, _) = scripted("one", Ok(Some(vec![0xDE, 0xAD])));
        let (s2, c2) = scripted("two", Ok(Some(tiny_png())));
        let resolver = SignatureResolver::new(vec![s1, s2], Duration::from_secs(1));

        let asset = resolver.resolve("Caso-1", &ProcessRecord::empty()).await;
        assert!(asset.image().is_some());
        assert_eq!(c2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_is_not_found_not_an_error() {
        let (s1, _) = scripted("one", Ok(None));
        let resolver = SignatureResolver::new(vec![s1], Duration::from_secs(1));
        let asset = resolver.resolve("Caso-1", &ProcessRecord::empty()).await;
        assert!(asset.image().is_none());
    }

    #[tokio::test]
    async fn inline_data_uri_decodes() {
        let png = tiny_png();
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let record = ProcessRecord::new(json!({ "assinatura": uri }));

        let got = InlineDataUriStrategy
            .attempt("Caso-1", &record)
            .await
            .unwrap();
        assert_eq!(got, Some(png));
    }

    #[tokio::test]
    async fn inline_strategy_ignores_plain_paths() {
        let record = ProcessRecord::new(json!({ "assinatura": "uploads/sig.png" }));
        let got = InlineDataUriStrategy
            .attempt("Caso-1", &record)
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn upload_paths_are_normalized_once() {
        assert_eq!(normalize_upload_path("/sig.png"), "uploads/sig.png");
        assert_eq!(normalize_upload_path("uploads/sig.png"), "uploads/sig.png");
        assert_eq!(normalize_upload_path("sig.png"), "uploads/sig.png");
    }

    #[test]
    fn decode_image_sniffs_format() {
        let img = decode_image(&tiny_png()).unwrap();
        assert_eq!(img.format, SignatureFormat::Png);
        assert_eq!((img.width, img.height), (1, 1));
        assert!(decode_image(&[0u8; 8]).is_err());
    }
}
