use serde::Serialize;

use crate::annotation::BoundingBox;
use crate::offsets::Offset;

const SCALE: f32 = 1000.0;
const BOTTOM_BAND: i32 = 850;
const LEFT_BAND: i32 = 100;
const RIGHT_BAND: i32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl PixelRect {
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

pub fn to_pixel_rect(bbox: &BoundingBox, canvas_w: f32, canvas_h: f32) -> PixelRect {
    let bbox = bbox.sanitized();
    let sx = canvas_w / SCALE;
    let sy = canvas_h / SCALE;
    PixelRect {
        x: bbox.xmin as f32 * sx,
        y: bbox.ymin as f32 * sy,
        w: (bbox.xmax - bbox.xmin) as f32 * sx,
        h: (bbox.ymax - bbox.ymin) as f32 * sy,
    }
}

/// Below the box unless the box sits in the bottom band; centered unless the
/// box touches the left or right band, in which case it aligns to that edge.
pub fn default_label_origin(
    bbox: &BoundingBox,
    rect: &PixelRect,
    label_w: f32,
    label_h: f32,
    gap: f32,
) -> Point {
    let bbox = bbox.sanitized();
    let y = if bbox.ymax > BOTTOM_BAND {
        rect.y - label_h - gap
    } else {
        rect.bottom() + gap
    };
    let x = if bbox.xmin < LEFT_BAND {
        rect.x
    } else if bbox.xmax > RIGHT_BAND {
        rect.right() - label_w
    } else {
        rect.x + rect.w / 2.0 - label_w / 2.0
    };
    Point { x, y }
}

pub fn apply_offset(origin: Point, offset: Offset, canvas_w: f32, canvas_h: f32) -> Point {
    Point {
        x: origin.x + offset.x * canvas_w / SCALE,
        y: origin.y + offset.y * canvas_h / SCALE,
    }
}

pub fn pixel_delta_to_normalized(dx: f32, dy: f32, canvas_w: f32, canvas_h: f32) -> Offset {
    Offset {
        x: dx * SCALE / canvas_w.max(f32::EPSILON),
        y: dy * SCALE / canvas_h.max(f32::EPSILON),
    }
}

/// Largest size with the natural aspect ratio that fits the bounds.
/// Never upscales.
pub fn fit_within(natural_w: u32, natural_h: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    let w = natural_w.max(1) as f32;
    let h = natural_h.max(1) as f32;
    let ratio = (max_w / w).min(max_h / h).min(1.0);
    if !ratio.is_finite() || ratio <= 0.0 {
        return (w, h);
    }
    (w * ratio, h * ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    #[test]
    fn pixel_rect_scenario() {
        let rect = to_pixel_rect(&BoundingBox::new(100, 100, 200, 300), 1000.0, 1000.0);
        assert_eq!(
            rect,
            PixelRect {
                x: 100.0,
                y: 100.0,
                w: 200.0,
                h: 100.0
            }
        );
        let origin = default_label_origin(&BoundingBox::new(100, 100, 200, 300), &rect, 80.0, 20.0, 4.0);
        assert!((origin.x - (200.0 - 40.0)).abs() < EPS);
        assert!(origin.y > rect.bottom());
    }

    #[test]
    fn pixel_rect_stays_in_canvas() {
        let sizes = [(1.0, 1.0), (333.0, 777.0), (1920.0, 1080.0), (4031.0, 17.0)];
        let boxes = [
            BoundingBox::new(0, 0, 1000, 1000),
            BoundingBox::new(0, 0, 0, 0),
            BoundingBox::new(999, 1, 1000, 1000),
            BoundingBox::new(123, 456, 789, 901),
        ];
        for (w, h) in sizes {
            for bbox in &boxes {
                let rect = to_pixel_rect(bbox, w, h);
                assert!(rect.x >= 0.0 && rect.y >= 0.0 && rect.w >= 0.0 && rect.h >= 0.0);
                assert!(rect.right() <= w + EPS * w);
                assert!(rect.bottom() <= h + EPS * h);
            }
        }
    }

    #[test]
    fn malformed_box_is_clamped_before_use() {
        let rect = to_pixel_rect(&BoundingBox::new(1200, 500, -10, 400), 1000.0, 1000.0);
        assert_eq!(rect.x, 400.0);
        assert_eq!(rect.y, 0.0);
        assert_eq!(rect.w, 100.0);
        assert_eq!(rect.h, 1000.0);
    }

    #[test]
    fn default_origin_is_pure() {
        let bbox = BoundingBox::new(300, 400, 350, 600);
        let rect = to_pixel_rect(&bbox, 640.0, 480.0);
        let first = default_label_origin(&bbox, &rect, 55.5, 17.0, 2.56);
        let second = default_label_origin(&bbox, &rect, 55.5, 17.0, 2.56);
        assert_eq!(first, second);
    }

    #[test]
    fn left_edge_box_aligns_label_left() {
        let bbox = BoundingBox::new(400, 0, 450, 300);
        let rect = to_pixel_rect(&bbox, 1000.0, 1000.0);
        let origin = default_label_origin(&bbox, &rect, 500.0, 20.0, 4.0);
        assert_eq!(origin.x, rect.x);
    }

    #[test]
    fn right_edge_box_aligns_label_right() {
        let bbox = BoundingBox::new(400, 700, 450, 950);
        let rect = to_pixel_rect(&bbox, 1000.0, 1000.0);
        let origin = default_label_origin(&bbox, &rect, 120.0, 20.0, 4.0);
        assert!((origin.x + 120.0 - rect.right()).abs() < EPS);
    }

    #[test]
    fn bottom_band_places_label_above() {
        let low = BoundingBox::new(860, 300, 900, 500);
        let rect = to_pixel_rect(&low, 1000.0, 1000.0);
        let origin = default_label_origin(&low, &rect, 60.0, 20.0, 4.0);
        assert!(origin.y < rect.y);

        let mid = BoundingBox::new(450, 300, 500, 500);
        let rect = to_pixel_rect(&mid, 1000.0, 1000.0);
        let origin = default_label_origin(&mid, &rect, 60.0, 20.0, 4.0);
        assert!(origin.y > rect.bottom());
    }

    #[test]
    fn offset_scales_with_resolution() {
        let offset = Offset { x: 50.0, y: -20.0 };
        let origin = Point::new(10.0, 10.0);
        let small = apply_offset(origin, offset, 1000.0, 1000.0);
        let large = apply_offset(origin, offset, 2000.0, 3000.0);
        let (dx1, dy1) = (small.x - origin.x, small.y - origin.y);
        let (dx2, dy2) = (large.x - origin.x, large.y - origin.y);
        assert!((dx1 - 50.0).abs() < EPS && (dy1 + 20.0).abs() < EPS);
        assert!((dx2 / dx1 - 2.0).abs() < EPS);
        assert!((dy2 / dy1 - 3.0).abs() < EPS);
    }

    #[test]
    fn pixel_delta_inverts_offset() {
        let offset = pixel_delta_to_normalized(25.0, -10.0, 500.0, 500.0);
        assert!((offset.x - 50.0).abs() < EPS);
        assert!((offset.y + 20.0).abs() < EPS);
        let back = apply_offset(Point::new(0.0, 0.0), offset, 500.0, 500.0);
        assert!((back.x - 25.0).abs() < EPS && (back.y + 10.0).abs() < EPS);
    }

    #[test]
    fn fit_within_keeps_aspect_and_never_upscales() {
        let (w, h) = fit_within(2000, 1000, 800.0, 800.0);
        assert!((w - 800.0).abs() < EPS && (h - 400.0).abs() < EPS);
        assert_eq!(fit_within(300, 200, 800.0, 800.0), (300.0, 200.0));
        let (w, h) = fit_within(1000, 3000, 900.0, 600.0);
        assert!((w - 200.0).abs() < EPS && (h - 600.0).abs() < EPS);
    }
}
