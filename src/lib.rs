//! # cplp-formfill
//!
//! Fill Portuguese immigration consent forms (CPLP and related processes)
//! from structured case records, producing a finished PDF with a text and
//! signature overlay on the official template.
//!
//! ## Why this crate?
//!
//! The consent templates are flat scans with no AcroForm fields, so the
//! usual form-filling toolchains have nothing to grab onto. Instead this
//! crate keeps a coordinate map per template variant and draws each value
//! directly onto the first page as a content-stream overlay, then carries
//! any uploaded supporting document through as extra pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! case id
//!  │
//!  ├─ 1. Classify   category from the id prefix → Adult or Minor variant
//!  ├─ 2. Resolve    each field through its candidate record paths,
//!  │                with OCR-text extraction as the fallback
//!  ├─ 3. Normalise  dates → zero-padded DD / MM / YYYY triples
//!  ├─ 4. Signature  strategy chain (upload, inline, local, preview, …)
//!  ├─ 5. Overlay    text + signature JPEG onto page 1 (spawn_blocking)
//!  └─ 6. Assemble   append uploaded document pages, serialize
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cplp_formfill::{MemoryFileStore, MemoryRecordStore, RenderConfig, Renderer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RenderConfig::builder()
//!         .adult_template_path("templates/consentimento_adulto.pdf")
//!         .minor_template_path("templates/consentimento_menor.pdf")
//!         .build()?;
//!     let renderer = Renderer::new(
//!         config,
//!         Arc::new(MemoryRecordStore::new()),
//!         Arc::new(MemoryFileStore::new()),
//!     );
//!     let result = renderer.render("CPLP-a1b2c3", None).await?;
//!     std::fs::write("out.pdf", &result.pdf)?;
//!     for note in &result.omissions {
//!         eprintln!("omitted: {note}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Degradation contract
//!
//! Only a missing or unparseable template aborts a render. Every other
//! failure — absent record, unresolvable field, dead signature source,
//! unfetchable upload — degrades to a blank spot on the form and a note
//! in [`RenderResult::omissions`], because an incomplete consent form a
//! caseworker can finish by hand beats no form at all.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod dates;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod render;
pub mod resolve;
pub mod signature;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{Classification, ClassificationTables, ProcessClassifier};
pub use config::{RenderConfig, RenderConfigBuilder};
pub use dates::{normalize_date, spelled_month, DateParts};
pub use error::{FetchError, RenderError};
pub use layout::{Anchor, LayoutRegistry, Variant};
pub use render::{RenderRequest, RenderResult, Renderer};
pub use resolve::ProcessRecord;
pub use signature::{SignatureAsset, SignatureImage, SignatureResolver, SignatureStrategy};
pub use store::{FileStore, HttpFileStore, MemoryFileStore, MemoryRecordStore, RecordStore};
