use image::imageops::{self, FilterType};
use tracing::debug;

use crate::annotation::Annotation;
use crate::error::CompositeError;
use crate::export::LoadedImage;
use crate::geometry::{self, Point};
use crate::layout::{self, Canvas, LabelLayout, LayoutOptions};
use crate::offsets::{Offset, OffsetStore};
use crate::raster::{self, OutputFormat};
use crate::scene::{self, OverlayStyle};

/// Everything a frame is drawn from. Only normalized data lives here.
#[derive(Clone, Copy)]
pub struct OverlayScene<'a> {
    pub annotations: &'a [Annotation],
    pub offsets: &'a OffsetStore,
    pub style: &'a OverlayStyle,
    pub options: LayoutOptions,
}

/// The image as displayed: natural aspect ratio, fitted into the viewport and
/// snapped to whole pixels so the raster preview and hit testing agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayView {
    natural_w: u32,
    natural_h: u32,
    canvas: Canvas,
}

impl OverlayView {
    pub fn fit(natural_w: u32, natural_h: u32, max_w: f32, max_h: f32) -> Self {
        let (w, h) = geometry::fit_within(natural_w, natural_h, max_w, max_h);
        Self {
            natural_w,
            natural_h,
            canvas: Canvas::new(w.round().max(1.0), h.round().max(1.0)),
        }
    }

    pub fn resize(&mut self, max_w: f32, max_h: f32) {
        *self = Self::fit(self.natural_w, self.natural_h, max_w, max_h);
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Recomputed on every call; the displayed size may have changed.
    pub fn layouts(&self, scene: &OverlayScene<'_>) -> Vec<LabelLayout> {
        layout::compute_layouts(
            scene.annotations,
            scene.offsets,
            self.canvas,
            &scene.style.label,
            scene.style.font(),
            scene.options,
        )
    }

    /// Topmost label under the pointer; later labels are drawn over earlier ones.
    pub fn hit_test(&self, pointer: Point, scene: &OverlayScene<'_>) -> Option<usize> {
        self.layouts(scene)
            .iter()
            .rev()
            .find(|layout| layout.label_rect.contains(pointer))
            .map(|layout| layout.index)
    }

    pub fn render_svg(&self, image_href: Option<&str>, scene: &OverlayScene<'_>) -> String {
        scene::build_svg(image_href, self.canvas, &self.layouts(scene), scene.style, true)
    }

    /// Preview SVG with the source embedded as a data URI.
    pub fn render_svg_embedded(
        &self,
        source_bytes: &[u8],
        mime: &str,
        scene: &OverlayScene<'_>,
    ) -> String {
        let href = scene::data_uri(source_bytes, mime);
        self.render_svg(Some(&href), scene)
    }

    /// Rasterized preview at the displayed size.
    pub fn render_png(
        &self,
        source: &LoadedImage,
        scene: &OverlayScene<'_>,
    ) -> Result<Vec<u8>, CompositeError> {
        let w = self.canvas.width as u32;
        let h = self.canvas.height as u32;
        let base = imageops::resize(&source.pixels, w, h, FilterType::Triangle);
        let layouts = self.layouts(scene);
        let svg = scene::build_svg(None, self.canvas, &layouts, scene.style, false);
        let font_data = scene.style.font().map(|metrics| metrics.data());
        let composed = raster::composite(&base, &svg, font_data)?;
        raster::encode(composed, OutputFormat::Png)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragGesture {
    index: usize,
    start: Point,
    start_offset: Offset,
}

/// Turns pointer gestures on a label into offset-store writes. Every move
/// writes through immediately; releasing needs no commit.
#[derive(Debug, Default)]
pub struct DragController {
    active: Option<DragGesture>,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn dragging_index(&self) -> Option<usize> {
        self.active.map(|gesture| gesture.index)
    }

    pub fn pointer_down(&mut self, index: usize, pointer: Point, store: &OffsetStore) {
        self.active = Some(DragGesture {
            index,
            start: pointer,
            start_offset: store.get(index),
        });
    }

    /// Hit-tests the pointer and starts a drag on the label found, if any.
    pub fn press(
        &mut self,
        pointer: Point,
        view: &OverlayView,
        scene: &OverlayScene<'_>,
    ) -> Option<usize> {
        let index = view.hit_test(pointer, scene)?;
        self.pointer_down(index, pointer, scene.offsets);
        Some(index)
    }

    pub fn pointer_move(
        &mut self,
        pointer: Point,
        canvas: Canvas,
        store: &mut OffsetStore,
    ) -> Option<(usize, Offset)> {
        let gesture = self.active?;
        let delta = geometry::pixel_delta_to_normalized(
            pointer.x - gesture.start.x,
            pointer.y - gesture.start.y,
            canvas.width,
            canvas.height,
        );
        let offset = gesture.start_offset.add(delta);
        store.set(gesture.index, offset);
        Some((gesture.index, offset))
    }

    pub fn pointer_up(&mut self) -> Option<usize> {
        let gesture = self.active.take()?;
        debug!("label {} released", gesture.index);
        Some(gesture.index)
    }
}
