//! Coordinate layouts: where each field lands on the consent page.
//!
//! The two layouts (adult, minor) are fixed, small, enumerable sets of
//! anchors measured once against the blank templates. They are pure
//! configuration: nothing here does IO or branches on record content.
//!
//! A lookup miss is an [`Option::None`], never an error — the renderer
//! skips silently, because a field the layout has no box for is not a
//! failure, it just does not appear on that variant's page.
//!
//! Coordinates are PDF page units (points), origin bottom-left, measured
//! on the 595 × 842 pt (A4) templates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Adult or minor rendering layout for the output PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Adult,
    Minor,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Adult => "adult",
            Variant::Minor => "minor",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed (x, y) position where a field's text is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

impl Anchor {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The three boxes of a composite date field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateAnchors {
    pub day: Anchor,
    pub month: Anchor,
    pub year: Anchor,
}

/// The "today" line at the signature block: day box plus spelled-out
/// month, no year (the template pre-prints "de 20__").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TodayAnchors {
    pub day: Anchor,
    pub month: Anchor,
}

/// Where and how large the signature image is drawn.
///
/// Height is fixed per layout; width follows the source aspect ratio so
/// signatures are never squashed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureAnchor {
    pub x: f32,
    pub y: f32,
    pub height: f32,
}

/// One variant's full anchor set.
#[derive(Debug, Clone)]
struct Layout {
    fields: BTreeMap<&'static str, Anchor>,
    dates: BTreeMap<&'static str, DateAnchors>,
    checkboxes: BTreeMap<&'static str, Anchor>,
    today: TodayAnchors,
    signature: SignatureAnchor,
    /// Free-text anchor used when the "other" checkbox is set.
    other_text: Anchor,
}

/// Static per-variant map of field and checkbox names to page anchors.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    adult: Layout,
    minor: Layout,
}

// Text field slot names. The renderer and the field plan share these.
pub const SUBJECT_NAME: &str = "subject_name";
pub const GUARDIAN_NAME: &str = "guardian_name";
pub const SUBJECT_DOCUMENT: &str = "subject_document";
pub const GUARDIAN_DOCUMENT: &str = "guardian_document";
pub const NATIONALITY: &str = "nationality";

// Date slot names.
pub const SUBJECT_VALIDITY: &str = "subject_validity";
pub const GUARDIAN_VALIDITY: &str = "guardian_validity";

// Checkbox slot names.
pub const CB_NOTIFY_EMAIL: &str = "notify_email";
pub const CB_NOTIFY_POST: &str = "notify_post";
pub const CB_DATA_PROCESSING: &str = "data_processing";
pub const CB_OTHER: &str = "other";

impl LayoutRegistry {
    /// Anchor for a plain text field, or `None` when the variant has no
    /// box for it (e.g. guardian name on the adult layout).
    pub fn anchor(&self, variant: Variant, field: &str) -> Option<Anchor> {
        self.layout(variant).fields.get(field).copied()
    }

    /// Day/month/year triple for a composite date field.
    pub fn date_anchors(&self, variant: Variant, field: &str) -> Option<DateAnchors> {
        self.layout(variant).dates.get(field).copied()
    }

    /// Anchor for a named checkbox.
    pub fn checkbox(&self, variant: Variant, name: &str) -> Option<Anchor> {
        self.layout(variant).checkboxes.get(name).copied()
    }

    /// The fixed "today" anchors at the signature block.
    pub fn today(&self, variant: Variant) -> TodayAnchors {
        self.layout(variant).today
    }

    /// Position and render height of the signature image.
    pub fn signature(&self, variant: Variant) -> SignatureAnchor {
        self.layout(variant).signature
    }

    /// Free-text anchor for the "other" checkbox detail line.
    pub fn other_text(&self, variant: Variant) -> Anchor {
        self.layout(variant).other_text
    }

    fn layout(&self, variant: Variant) -> &Layout {
        match variant {
            Variant::Adult => &self.adult,
            Variant::Minor => &self.minor,
        }
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self {
            adult: adult_layout(),
            minor: minor_layout(),
        }
    }
}

fn adult_layout() -> Layout {
    Layout {
        fields: BTreeMap::from([
            (SUBJECT_NAME, Anchor::new(112.0, 652.0)),
            (SUBJECT_DOCUMENT, Anchor::new(150.0, 628.0)),
        ]),
        dates: BTreeMap::from([(
            SUBJECT_VALIDITY,
            DateAnchors {
                day: Anchor::new(318.0, 628.0),
                month: Anchor::new(346.0, 628.0),
                year: Anchor::new(374.0, 628.0),
            },
        )]),
        checkboxes: BTreeMap::from([
            (CB_NOTIFY_EMAIL, Anchor::new(86.5, 530.0)),
            (CB_NOTIFY_POST, Anchor::new(86.5, 506.0)),
            (CB_DATA_PROCESSING, Anchor::new(86.5, 482.0)),
            (CB_OTHER, Anchor::new(86.5, 458.0)),
        ]),
        today: TodayAnchors {
            day: Anchor::new(120.0, 196.0),
            month: Anchor::new(168.0, 196.0),
        },
        signature: SignatureAnchor {
            x: 330.0,
            y: 168.0,
            height: 28.0,
        },
        other_text: Anchor::new(140.0, 458.0),
    }
}

fn minor_layout() -> Layout {
    Layout {
        fields: BTreeMap::from([
            (SUBJECT_NAME, Anchor::new(128.0, 640.0)),
            (GUARDIAN_NAME, Anchor::new(128.0, 598.0)),
            (SUBJECT_DOCUMENT, Anchor::new(150.0, 616.0)),
            (GUARDIAN_DOCUMENT, Anchor::new(150.0, 574.0)),
            (NATIONALITY, Anchor::new(390.0, 640.0)),
        ]),
        dates: BTreeMap::from([
            (
                SUBJECT_VALIDITY,
                DateAnchors {
                    day: Anchor::new(318.0, 616.0),
                    month: Anchor::new(346.0, 616.0),
                    year: Anchor::new(374.0, 616.0),
                },
            ),
            (
                GUARDIAN_VALIDITY,
                DateAnchors {
                    day: Anchor::new(318.0, 574.0),
                    month: Anchor::new(346.0, 574.0),
                    year: Anchor::new(374.0, 574.0),
                },
            ),
        ]),
        checkboxes: BTreeMap::from([
            (CB_NOTIFY_EMAIL, Anchor::new(86.5, 512.0)),
            (CB_NOTIFY_POST, Anchor::new(86.5, 488.0)),
            (CB_DATA_PROCESSING, Anchor::new(86.5, 464.0)),
            (CB_OTHER, Anchor::new(86.5, 440.0)),
        ]),
        today: TodayAnchors {
            day: Anchor::new(120.0, 182.0),
            month: Anchor::new(168.0, 182.0),
        },
        signature: SignatureAnchor {
            x: 330.0,
            y: 154.0,
            height: 28.0,
        },
        other_text: Anchor::new(140.0, 440.0),
    }
}
