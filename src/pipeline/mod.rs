//! The PDF composition pipeline.
//!
//! Three stages, each a separate module:
//!
//! 1. [`template`] — load and validate the blank form template, count
//!    pages of uploaded documents;
//! 2. [`overlay`] — draw resolved values, checkbox marks, and the
//!    signature image onto the consent page via content-stream operations;
//! 3. [`assemble`] — carry pages 2..N of an uploaded complete document
//!    through verbatim behind the freshly rendered consent page.
//!
//! Everything in here is CPU-bound lopdf work; the renderer runs it inside
//! `spawn_blocking` so template parsing and serialisation never stall the
//! async workers.

pub mod assemble;
pub mod overlay;
pub mod template;
