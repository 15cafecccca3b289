//! Attachment reassembly: carry uploaded pages 2..N behind the consent page.
//!
//! When a case carries an uploaded "complete" multi-page document, page 1
//! is always re-rendered from the blank template — uploaded first pages
//! have unpredictable geometry and would invalidate every anchor — while
//! pages 2..N pass through byte-for-byte untouched.
//!
//! The merge is the usual lopdf recipe: renumber the attachment's objects
//! past the base document's `max_id`, move them across, reparent the
//! carried pages under the base Pages node, and drop the attachment's own
//! catalog and page-tree root. Inheritable page attributes (Resources,
//! MediaBox, CropBox, Rotate) are copied down onto each carried page first,
//! since their original parent node does not survive the move.

use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// Inheritable attributes hoisted from the attachment's Pages node.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Append pages 2..N of `attachment` to `base`. Returns how many pages
/// were carried across.
///
/// Errors are strings for the caller to absorb: a malformed attachment
/// degrades the render to the consent page alone, it never fails it.
pub fn append_attachment_pages(base: &mut Document, attachment: &[u8]) -> Result<usize, String> {
    let mut att = Document::load_mem(attachment).map_err(|e| format!("attachment parse: {e}"))?;

    att.renumber_objects_with(base.max_id + 1);
    base.max_id = att.max_id;

    // Sorted by page number, so carried pages keep their original order.
    let att_pages: Vec<(u32, ObjectId)> = att.get_pages().into_iter().collect();
    if att_pages.len() < 2 {
        return Ok(0);
    }

    let att_root = att
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| format!("attachment trailer: {e}"))?;
    let att_pages_root = att
        .get_object(att_root)
        .and_then(Object::as_dict)
        .and_then(|c| c.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| format!("attachment catalog: {e}"))?;
    let inherited: Vec<(&[u8], Object)> = {
        let pages_dict = att
            .get_object(att_pages_root)
            .and_then(Object::as_dict)
            .map_err(|e| format!("attachment pages node: {e}"))?;
        INHERITABLE
            .iter()
            .filter_map(|&key| pages_dict.get(key).ok().map(|v| (key, v.clone())))
            .collect()
    };

    let base_pages_root = pages_root(base)?;

    base.objects.extend(std::mem::take(&mut att.objects));
    base.objects.remove(&att_root);
    base.objects.remove(&att_pages_root);

    let carried: Vec<ObjectId> = att_pages
        .iter()
        .filter(|(num, _)| *num >= 2)
        .map(|(_, id)| *id)
        .collect();

    for &page_id in &carried {
        let page = base
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| format!("carried page {page_id:?}: {e}"))?;
        page.set("Parent", Object::Reference(base_pages_root));
        for &(key, ref value) in &inherited {
            if !page.has(key) {
                page.set(key, value.clone());
            }
        }
    }

    // First page of the attachment is dropped by design; it is replaced
    // by the freshly rendered consent page.
    base.objects.remove(&att_pages[0].1);

    let pages_dict = base
        .get_object_mut(base_pages_root)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("base pages node: {e}"))?;
    match pages_dict.get_mut(b"Kids").and_then(Object::as_array_mut) {
        Ok(kids) => kids.extend(carried.iter().map(|id| Object::Reference(*id))),
        Err(e) => return Err(format!("base Kids array: {e}")),
    }
    let count = pages_dict
        .get(b"Count")
        .and_then(Object::as_i64)
        .unwrap_or(0);
    pages_dict.set("Count", count + carried.len() as i64);

    debug!(carried = carried.len(), "attachment pages appended");
    Ok(carried.len())
}

/// The base document's Pages tree root, via the trailer catalog.
fn pages_root(doc: &Document) -> Result<ObjectId, String> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|root| doc.get_object(root))
        .and_then(Object::as_dict)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| format!("base catalog: {e}"))
}
