use serde::Serialize;

use crate::annotation::Annotation;
use crate::font::{FontMetrics, measure_text_width_px};
use crate::geometry::{self, PixelRect};
use crate::offsets::{Offset, OffsetStore};

/// Canvas width every style length is expressed against.
pub const REFERENCE_WIDTH: f32 = 1000.0;

const MAX_NUDGE_STEPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn scale(&self) -> f32 {
        self.width / REFERENCE_WIDTH
    }
}

/// Label lengths at [`REFERENCE_WIDTH`]; all of them scale with the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
    pub font_size: f32,
    pub line_height: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub handle_width: f32,
    pub gap: f32,
    pub stroke_width: f32,
    pub min_stroke_width: f32,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            line_height: 1.25,
            padding_x: 8.0,
            padding_y: 4.0,
            handle_width: 14.0,
            gap: 4.0,
            stroke_width: 3.0,
            min_stroke_width: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayoutOptions {
    pub avoid_overlaps: bool,
}

/// Style resolved for one canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelMetrics {
    pub font_size: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub handle_width: f32,
    pub gap: f32,
    pub stroke_width: f32,
}

impl LabelMetrics {
    pub fn resolve(style: &LabelStyle, canvas: Canvas) -> Self {
        let scale = canvas.scale();
        Self {
            font_size: style.font_size * scale,
            padding_x: style.padding_x * scale,
            padding_y: style.padding_y * scale,
            handle_width: style.handle_width * scale,
            gap: style.gap * scale,
            stroke_width: (style.stroke_width * scale).max(style.min_stroke_width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelLayout {
    pub index: usize,
    pub text: String,
    pub box_rect: PixelRect,
    pub label_rect: PixelRect,
    pub metrics: LabelMetrics,
}

pub fn label_size(
    text: &str,
    style: &LabelStyle,
    metrics: &LabelMetrics,
    font: Option<&FontMetrics>,
) -> (f32, f32) {
    let text_w = measure_text_width_px(text.trim(), metrics.font_size, font);
    let w = text_w + metrics.padding_x * 2.0 + metrics.handle_width;
    let h = metrics.font_size * style.line_height + metrics.padding_y * 2.0;
    (w, h)
}

pub fn compute_layout(
    index: usize,
    annotation: &Annotation,
    offset: Offset,
    canvas: Canvas,
    style: &LabelStyle,
    font: Option<&FontMetrics>,
) -> LabelLayout {
    let metrics = LabelMetrics::resolve(style, canvas);
    let box_rect = geometry::to_pixel_rect(&annotation.box_2d, canvas.width, canvas.height);
    let (label_w, label_h) = label_size(&annotation.translation, style, &metrics, font);
    let origin =
        geometry::default_label_origin(&annotation.box_2d, &box_rect, label_w, label_h, metrics.gap);
    let origin = geometry::apply_offset(origin, offset, canvas.width, canvas.height);
    LabelLayout {
        index,
        text: annotation.translation.trim().to_string(),
        box_rect,
        label_rect: PixelRect {
            x: origin.x,
            y: origin.y,
            w: label_w,
            h: label_h,
        },
        metrics,
    }
}

/// Layouts for every drawable annotation, in list order with original indices.
pub fn compute_layouts(
    annotations: &[Annotation],
    offsets: &OffsetStore,
    canvas: Canvas,
    style: &LabelStyle,
    font: Option<&FontMetrics>,
    options: LayoutOptions,
) -> Vec<LabelLayout> {
    let mut layouts: Vec<LabelLayout> = annotations
        .iter()
        .enumerate()
        .filter(|(_, annotation)| !annotation.is_identical())
        .map(|(index, annotation)| {
            compute_layout(index, annotation, offsets.get(index), canvas, style, font)
        })
        .collect();
    if options.avoid_overlaps {
        nudge_overlaps(&mut layouts, annotations, offsets, canvas);
    }
    layouts
}

/// Moves labels that were never dragged away from earlier labels, one gap at
/// a time, in the direction they already sit relative to their box.
fn nudge_overlaps(
    layouts: &mut [LabelLayout],
    annotations: &[Annotation],
    offsets: &OffsetStore,
    canvas: Canvas,
) {
    for current in 0..layouts.len() {
        let (placed, rest) = layouts.split_at_mut(current);
        let layout = &mut rest[0];
        if offsets.get(layout.index) != Offset::ZERO {
            continue;
        }
        let above = annotations[layout.index].box_2d.sanitized().ymax > 850;
        let step = layout.metrics.gap.max(1.0) * if above { -1.0 } else { 1.0 };
        let mut candidate = layout.label_rect;
        for _ in 0..MAX_NUDGE_STEPS {
            if !placed.iter().any(|other| other.label_rect.intersects(&candidate)) {
                layout.label_rect = candidate;
                break;
            }
            candidate.y += step;
            if candidate.y < 0.0 || candidate.bottom() > canvas.height {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BoundingBox;

    fn sample(translation: &str, bbox: BoundingBox) -> Annotation {
        Annotation::new("source", translation, bbox)
    }

    #[test]
    fn layout_scales_proportionally_with_canvas() {
        let annotation = sample("Emergency exit", BoundingBox::new(300, 250, 340, 600));
        let style = LabelStyle::default();
        let offset = Offset::new(12.0, -7.0);
        let small = compute_layout(0, &annotation, offset, Canvas::new(800.0, 600.0), &style, None);
        let large = compute_layout(0, &annotation, offset, Canvas::new(1600.0, 1200.0), &style, None);
        let ratio = |a: f32, b: f32| (b / a - 2.0).abs() < 1e-4;
        assert!(ratio(small.label_rect.x, large.label_rect.x));
        assert!(ratio(small.label_rect.y, large.label_rect.y));
        assert!(ratio(small.label_rect.w, large.label_rect.w));
        assert!(ratio(small.label_rect.h, large.label_rect.h));
        assert!(ratio(small.box_rect.w, large.box_rect.w));
    }

    #[test]
    fn centered_label_below_box() {
        let annotation = Annotation::new("Exit", "出口", BoundingBox::new(100, 100, 200, 300));
        let layout = compute_layout(
            0,
            &annotation,
            Offset::ZERO,
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
        );
        insta::assert_json_snapshot!(layout, @r###"
        {
          "index": 0,
          "text": "出口",
          "box_rect": {
            "x": 100.0,
            "y": 100.0,
            "w": 200.0,
            "h": 100.0
          },
          "label_rect": {
            "x": 169.0,
            "y": 204.0,
            "w": 62.0,
            "h": 28.0
          },
          "metrics": {
            "font_size": 16.0,
            "padding_x": 8.0,
            "padding_y": 4.0,
            "handle_width": 14.0,
            "gap": 4.0,
            "stroke_width": 3.0
          }
        }
        "###);
    }

    #[test]
    fn label_width_includes_padding_and_handle() {
        let style = LabelStyle::default();
        let metrics = LabelMetrics::resolve(&style, Canvas::new(1000.0, 1000.0));
        let (w, h) = label_size("", &style, &metrics, None);
        assert!((w - (8.0 * 2.0 + 14.0)).abs() < 1e-4);
        assert!((h - (16.0 * 1.25 + 8.0)).abs() < 1e-4);
    }

    #[test]
    fn stroke_width_has_a_floor() {
        let style = LabelStyle::default();
        let thin = LabelMetrics::resolve(&style, Canvas::new(120.0, 900.0));
        assert_eq!(thin.stroke_width, style.min_stroke_width);
        let wide = LabelMetrics::resolve(&style, Canvas::new(4000.0, 900.0));
        assert!((wide.stroke_width - 12.0).abs() < 1e-4);
    }

    #[test]
    fn identical_annotations_are_skipped_but_keep_indices() {
        let annotations = vec![
            sample("Exit", BoundingBox::new(100, 100, 200, 300)),
            Annotation::new("2024", " 2024 ", BoundingBox::new(300, 300, 400, 400)),
            sample("Stairs", BoundingBox::new(500, 500, 600, 600)),
        ];
        let layouts = compute_layouts(
            &annotations,
            &OffsetStore::new(),
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
            LayoutOptions::default(),
        );
        let indices: Vec<usize> = layouts.iter().map(|layout| layout.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(annotations.len(), 3);
    }

    #[test]
    fn empty_detection_lays_out_nothing() {
        let layouts = compute_layouts(
            &[],
            &OffsetStore::new(),
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
            LayoutOptions::default(),
        );
        assert!(layouts.is_empty());
    }

    fn stacked() -> Vec<Annotation> {
        vec![
            sample("First label", BoundingBox::new(100, 400, 150, 600)),
            sample("Second label", BoundingBox::new(110, 400, 150, 600)),
        ]
    }

    #[test]
    fn overlapping_labels_are_kept_by_default() {
        let layouts = compute_layouts(
            &stacked(),
            &OffsetStore::new(),
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
            LayoutOptions::default(),
        );
        assert!(layouts[0].label_rect.intersects(&layouts[1].label_rect));
    }

    #[test]
    fn avoid_overlaps_nudges_later_labels_apart() {
        let layouts = compute_layouts(
            &stacked(),
            &OffsetStore::new(),
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
            LayoutOptions {
                avoid_overlaps: true,
            },
        );
        assert!(!layouts[0].label_rect.intersects(&layouts[1].label_rect));
        assert!(layouts[1].label_rect.y > layouts[0].label_rect.y);
    }

    #[test]
    fn avoid_overlaps_leaves_dragged_labels_alone() {
        let mut offsets = OffsetStore::new();
        offsets.set(1, Offset::new(1.0, 0.0));
        let layouts = compute_layouts(
            &stacked(),
            &offsets,
            Canvas::new(1000.0, 1000.0),
            &LabelStyle::default(),
            None,
            LayoutOptions {
                avoid_overlaps: true,
            },
        );
        assert!(layouts[0].label_rect.intersects(&layouts[1].label_rect));
    }
}
