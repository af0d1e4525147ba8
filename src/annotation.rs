use serde::{Deserialize, Serialize};
use tracing::debug;

pub const NORMALIZED_MAX: i32 = 1000;

/// Normalized `[ymin, xmin, ymax, xmax]` box in `0..=1000`, y before x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub ymin: i32,
    pub xmin: i32,
    pub ymax: i32,
    pub xmax: i32,
}

impl BoundingBox {
    pub fn new(ymin: i32, xmin: i32, ymax: i32, xmax: i32) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    /// Clamps every coordinate into range and swaps inverted pairs.
    pub fn sanitized(&self) -> Self {
        let clamp = |value: i32| value.clamp(0, NORMALIZED_MAX);
        let (y0, y1) = (clamp(self.ymin), clamp(self.ymax));
        let (x0, x1) = (clamp(self.xmin), clamp(self.xmax));
        Self {
            ymin: y0.min(y1),
            xmin: x0.min(x1),
            ymax: y0.max(y1),
            xmax: x0.max(x1),
        }
    }

    pub fn is_valid(&self) -> bool {
        *self == self.sanitized()
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(value: [i32; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(value: BoundingBox) -> Self {
        [value.ymin, value.xmin, value.ymax, value.xmax]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub original: String,
    pub translation: String,
    pub box_2d: BoundingBox,
}

impl Annotation {
    pub fn new(
        original: impl Into<String>,
        translation: impl Into<String>,
        box_2d: BoundingBox,
    ) -> Self {
        Self {
            original: original.into(),
            translation: translation.into(),
            box_2d,
        }
    }

    /// Numerals and symbols usually come back untranslated; those are not drawn.
    pub fn is_identical(&self) -> bool {
        self.original.trim() == self.translation.trim()
    }
}

/// Loosely typed record as returned by a detection model.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawAnnotation {
    pub(crate) original: Option<String>,
    pub(crate) translation: Option<String>,
    pub(crate) box_2d: Option<Vec<f64>>,
}

impl RawAnnotation {
    fn into_annotation(self) -> Option<Annotation> {
        let original = self.original?;
        let translation = self.translation?;
        let coords = self.box_2d?;
        if coords.len() != 4 || coords.iter().any(|value| !value.is_finite()) {
            return None;
        }
        let to_int = |value: f64| value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        let box_2d = BoundingBox::new(
            to_int(coords[0]),
            to_int(coords[1]),
            to_int(coords[2]),
            to_int(coords[3]),
        )
        .sanitized();
        Some(Annotation {
            original,
            translation,
            box_2d,
        })
    }
}

/// Keeps every record that can become a complete annotation, in order.
pub(crate) fn collect_annotations(raw: Vec<RawAnnotation>) -> Vec<Annotation> {
    let total = raw.len();
    let annotations: Vec<Annotation> = raw
        .into_iter()
        .filter_map(RawAnnotation::into_annotation)
        .collect();
    if annotations.len() != total {
        debug!(
            "dropped {} malformed annotation(s) out of {}",
            total - annotations.len(),
            total
        );
    }
    annotations
}

pub fn parse_annotations_json(text: &str) -> anyhow::Result<Vec<Annotation>> {
    let raw: Vec<RawAnnotation> = serde_json::from_str(text.trim())
        .map_err(|err| anyhow::anyhow!("failed to parse annotations JSON: {}", err))?;
    Ok(collect_annotations(raw))
}
