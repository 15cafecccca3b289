//! Content-stream overlay: draw text and the signature image onto page 1.
//!
//! The overlay is drawn by appending a new content stream to the template's
//! first page — PDF paints streams in order, so overlaid values always land
//! on top of the template artwork and nothing in the template is touched.
//!
//! Text is drawn with the built-in Helvetica Type1 font under
//! WinAnsiEncoding, which covers the Portuguese repertoire (ã, ç, é, …)
//! without font embedding. Characters outside WinAnsi degrade to `?` —
//! visible and reviewable on the output form.

use crate::error::RenderError;
use crate::signature::SignatureImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Resource names registered on the page by the overlay.
///
/// Prefixed to avoid colliding with whatever the template already calls
/// its own fonts.
const FONT_RES: &str = "FcF1";
const XOBJ_PREFIX: &str = "FcSg";

/// One drawing instruction for the consent page.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// Text at an anchor. `size` overrides the configured default
    /// (checkbox "X" marks draw slightly larger than field text).
    Text {
        x: f32,
        y: f32,
        text: String,
        size: Option<f32>,
    },
    /// The signature image, already sized by the caller
    /// (fixed height, aspect-preserved width).
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        jpeg: Vec<u8>,
        px_width: u32,
        px_height: u32,
    },
}

/// Draw all ops onto the document's first page.
///
/// Fails only when the document has no page at all — which means the
/// template was unusable, a fatal condition.
pub fn overlay_first_page(
    doc: &mut Document,
    ops: &[DrawOp],
    default_font_size: f32,
) -> Result<(), RenderError> {
    let page_id = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| RenderError::Assembly("template has no pages".into()))?;

    // Image XObjects first; the content stream references them by name.
    let mut xobjects: Vec<(String, ObjectId)> = Vec::new();
    let mut operations: Vec<Operation> = Vec::new();

    for op in ops {
        match op {
            DrawOp::Text { x, y, text, size } => {
                if text.is_empty() {
                    continue;
                }
                let size = size.unwrap_or(default_font_size);
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec![FONT_RES.into(), size.into()]));
                operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_win_ansi(text),
                        lopdf::StringFormat::Literal,
                    )],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            DrawOp::Image {
                x,
                y,
                width,
                height,
                jpeg,
                px_width,
                px_height,
            } => {
                let name = format!("{XOBJ_PREFIX}{}", xobjects.len());
                let xobject_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => *px_width as i64,
                        "Height" => *px_height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    jpeg.clone(),
                ));
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        (*width).into(),
                        0.into(),
                        0.into(),
                        (*height).into(),
                        (*x).into(),
                        (*y).into(),
                    ],
                ));
                operations.push(Operation::new("Do", vec![name.as_str().into()]));
                operations.push(Operation::new("Q", vec![]));
                xobjects.push((name, xobject_id));
            }
        }
    }

    if operations.is_empty() {
        debug!("overlay produced no operations; page left untouched");
        return Ok(());
    }

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| RenderError::Assembly(format!("content stream encode: {e}")))?;
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    append_page_content(doc, page_id, stream_id)?;
    register_resources(doc, page_id, font_id, &xobjects)?;

    debug!(ops = ops.len(), xobjects = xobjects.len(), "overlay applied");
    Ok(())
}

/// Append a content stream to the page's `Contents`, preserving whatever
/// the template already draws beneath it.
fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    stream_id: ObjectId,
) -> Result<(), RenderError> {
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| RenderError::Assembly(format!("page dictionary: {e}")))?;

    let new_contents = match page.get(b"Contents") {
        Ok(Object::Array(existing)) => {
            let mut arr = existing.clone();
            arr.push(Object::Reference(stream_id));
            Object::Array(arr)
        }
        Ok(Object::Reference(existing)) => Object::Array(vec![
            Object::Reference(*existing),
            Object::Reference(stream_id),
        ]),
        _ => Object::Reference(stream_id),
    };
    page.set("Contents", new_contents);
    Ok(())
}

/// Register the overlay font and image XObjects on the page resources.
///
/// Resources may live inline on the page or behind a reference; both are
/// handled, and a page with no resources at all gets a fresh dictionary.
fn register_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    xobjects: &[(String, ObjectId)],
) -> Result<(), RenderError> {
    enum Location {
        Inline,
        Referenced(ObjectId),
    }

    let location = {
        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| RenderError::Assembly(format!("page dictionary: {e}")))?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => Location::Referenced(*id),
            Ok(Object::Dictionary(_)) => Location::Inline,
            _ => {
                page.set("Resources", Dictionary::new());
                Location::Inline
            }
        }
    };

    let resources = match location {
        Location::Inline => doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .and_then(|page| page.get_mut(b"Resources"))
            .and_then(Object::as_dict_mut),
        Location::Referenced(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut),
    }
    .map_err(|e| RenderError::Assembly(format!("page resources: {e}")))?;

    match resources.get_mut(b"Font") {
        Ok(Object::Dictionary(fonts)) => fonts.set(FONT_RES, Object::Reference(font_id)),
        _ => {
            resources.set(
                "Font",
                dictionary! { FONT_RES => Object::Reference(font_id) },
            );
        }
    }

    if !xobjects.is_empty() {
        match resources.get_mut(b"XObject") {
            Ok(Object::Dictionary(xs)) => {
                for (name, id) in xobjects {
                    xs.set(name.as_str(), Object::Reference(*id));
                }
            }
            _ => {
                let mut xs = Dictionary::new();
                for (name, id) in xobjects {
                    xs.set(name.as_str(), Object::Reference(*id));
                }
                resources.set("XObject", xs);
            }
        }
    }

    Ok(())
}

/// Re-encode a decoded signature as baseline JPEG for DCTDecode embedding.
///
/// One embedding path for both PNG and JPEG sources keeps the XObject
/// dictionary fixed; JPEG quality 90 is visually lossless at signature
/// sizes. Transparency is flattened onto white, matching the paper form.
pub fn jpeg_for_embedding(img: &SignatureImage) -> Result<(Vec<u8>, u32, u32), RenderError> {
    use image::codecs::jpeg::JpegEncoder;

    let decoded = image::load_from_memory(&img.bytes)
        .map_err(|e| RenderError::Internal(format!("signature re-decode: {e}")))?;

    let rgba = decoded.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut flat = image::RgbImage::from_pixel(w, h, image::Rgb([255, 255, 255]));
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u32;
        let bg = flat.get_pixel_mut(x, y);
        for c in 0..3 {
            bg[c] = ((px[c] as u32 * a + bg[c] as u32 * (255 - a)) / 255) as u8;
        }
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode(flat.as_raw(), w, h, image::ExtendedColorType::Rgb8)
        .map_err(|e| RenderError::Internal(format!("signature JPEG encode: {e}")))?;
    Ok((jpeg, w, h))
}

/// Map text to WinAnsiEncoding bytes; unmappable characters become `?`.
///
/// WinAnsi matches Latin-1 outside the 0x80–0x9F window, which is all the
/// Portuguese form content needs.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            match code {
                0x20..=0x7E => code as u8,
                0xA0..=0xFF => code as u8,
                _ => b'?',
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_doc() -> Document {
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
        doc
    }

    fn text_op(text: &str) -> DrawOp {
        DrawOp::Text {
            x: 100.0,
            y: 700.0,
            text: text.into(),
            size: None,
        }
    }

    #[test]
    fn overlay_produces_a_reloadable_pdf() {
        let mut doc = blank_doc();
        overlay_first_page(&mut doc, &[text_op("Ana Silva")], 10.0).unwrap();

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        let reloaded = Document::load_mem(&buf).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
        // The overlay stream is uncompressed; the literal must survive.
        assert!(buf.windows(b"Ana Silva".len()).any(|w| w == b"Ana Silva"));
    }

    #[test]
    fn empty_text_ops_draw_nothing() {
        let mut doc = blank_doc();
        let before = doc.objects.len();
        overlay_first_page(&mut doc, &[text_op("")], 10.0).unwrap();
        assert_eq!(doc.objects.len(), before, "no stream should be added");
    }

    #[test]
    fn existing_contents_reference_becomes_an_array() {
        let mut doc = blank_doc();
        let page_id = *doc.get_pages().values().next().unwrap();
        let original = doc.add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Contents", Object::Reference(original));

        overlay_first_page(&mut doc, &[text_op("X")], 10.0).unwrap();

        let page = doc.get_object(page_id).and_then(Object::as_dict).unwrap();
        let contents = page.get(b"Contents").and_then(Object::as_array).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0], Object::Reference(original));
    }

    #[test]
    fn win_ansi_keeps_portuguese_letters() {
        assert_eq!(encode_win_ansi("João"), vec![b'J', b'o', 0xE3, b'o']);
        assert_eq!(encode_win_ansi("ç"), vec![0xE7]);
        // Outside WinAnsi degrades visibly, not silently.
        assert_eq!(encode_win_ansi("名"), vec![b'?']);
    }

    #[test]
    fn signature_embedding_flattens_to_jpeg() {
        use image::{ImageFormat, Rgba, RgbaImage};
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        let img = SignatureImage {
            bytes: buf.into_inner(),
            format: crate::signature::SignatureFormat::Png,
            width: 4,
            height: 2,
        };
        let (jpeg, w, h) = jpeg_for_embedding(&img).unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
        assert_eq!((w, h), (4, 2));
    }
}
