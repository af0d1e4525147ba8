use image::RgbaImage;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::annotation::Annotation;
use crate::error::CompositeError;
use crate::layout::{self, Canvas, LabelLayout, LayoutOptions};
use crate::offsets::OffsetStore;
use crate::raster::{self, OutputFormat};
use crate::scene::{self, OverlayStyle};

pub const DEFAULT_ASSET_TIMEOUT: Duration = Duration::from_secs(10);

/// A decoded source image, ready to draw.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub pixels: RgbaImage,
    pub mime: String,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width() as f32, self.height() as f32)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub format: OutputFormat,
    pub asset_timeout: Duration,
    pub layout: LayoutOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            asset_timeout: DEFAULT_ASSET_TIMEOUT,
            layout: LayoutOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Resolves once the source asset is decoded, or fails after `wait`.
///
/// A timed-out decode is abandoned, not cancelled: its blocking worker runs
/// to completion in the background and the result is dropped.
pub async fn load_source(bytes: Vec<u8>, wait: Duration) -> Result<LoadedImage, CompositeError> {
    let decode = tokio::task::spawn_blocking(move || {
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        image::load_from_memory(&bytes)
            .map(|decoded| LoadedImage {
                pixels: decoded.to_rgba8(),
                mime,
            })
            .map_err(|err| CompositeError::AssetLoad(err.to_string()))
    });
    match timeout(wait, decode).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(CompositeError::AssetLoad(join.to_string())),
        Err(_) => Err(CompositeError::AssetTimeout(wait)),
    }
}

/// Native-resolution layouts, exactly as the compositor places them.
pub fn native_layouts(
    source: &LoadedImage,
    annotations: &[Annotation],
    offsets: &OffsetStore,
    style: &OverlayStyle,
    options: LayoutOptions,
) -> Vec<LabelLayout> {
    layout::compute_layouts(
        annotations,
        offsets,
        source.canvas(),
        &style.label,
        style.font(),
        options,
    )
}

pub fn composite_loaded(
    source: &LoadedImage,
    annotations: &[Annotation],
    offsets: &OffsetStore,
    style: &OverlayStyle,
    options: &ExportOptions,
) -> Result<ExportArtifact, CompositeError> {
    let layouts = native_layouts(source, annotations, offsets, style, options.layout);
    debug!(
        "compositing {} label(s) at {}x{}",
        layouts.len(),
        source.width(),
        source.height()
    );
    let svg = scene::build_svg(None, source.canvas(), &layouts, style, false);
    let font_data = style.font().map(|metrics| metrics.data());
    let composed = raster::composite(&source.pixels, &svg, font_data)?;
    let bytes = raster::encode(composed, options.format)?;
    info!(
        "exported {}x{} composite ({} bytes, {})",
        source.width(),
        source.height(),
        bytes.len(),
        options.format.mime()
    );
    Ok(ExportArtifact {
        bytes,
        mime: options.format.mime(),
        width: source.width(),
        height: source.height(),
    })
}

/// Decodes `source`, then rasterizes boxes and labels over it at native size.
/// Rendering and encoding run on a blocking worker.
pub async fn export_composite(
    source: Vec<u8>,
    annotations: &[Annotation],
    offsets: &OffsetStore,
    style: &OverlayStyle,
    options: &ExportOptions,
) -> Result<ExportArtifact, CompositeError> {
    let loaded = load_source(source, options.asset_timeout).await?;
    let annotations = annotations.to_vec();
    let offsets = offsets.clone();
    let style = style.clone();
    let options = *options;
    tokio::task::spawn_blocking(move || {
        composite_loaded(&loaded, &annotations, &offsets, &style, &options)
    })
    .await
    .map_err(|err| CompositeError::Render(format!("export task failed: {}", err)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BoundingBox;
    use crate::offsets::Offset;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn png_options() -> ExportOptions {
        ExportOptions {
            format: OutputFormat::Png,
            ..ExportOptions::default()
        }
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_load() {
        let err = load_source(b"not an image".to_vec(), DEFAULT_ASSET_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CompositeError::AssetLoad(_)));
    }

    #[tokio::test]
    async fn slow_decode_times_out_instead_of_hanging() {
        let wait = Duration::from_millis(1);
        let err = load_source(white_png(4000, 4000), wait).await.unwrap_err();
        assert!(matches!(err, CompositeError::AssetTimeout(limit) if limit == wait));
    }

    #[tokio::test]
    async fn export_fails_with_timeout_before_drawing() {
        let options = ExportOptions {
            asset_timeout: Duration::from_millis(1),
            ..png_options()
        };
        let annotations = vec![Annotation::new(
            "Ausgang",
            "Exit",
            BoundingBox::new(100, 100, 500, 500),
        )];
        let err = export_composite(
            white_png(4000, 4000),
            &annotations,
            &OffsetStore::new(),
            &OverlayStyle::default(),
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CompositeError::AssetTimeout(_)));
    }

    #[tokio::test]
    async fn readiness_reports_native_size_and_mime() {
        let loaded = load_source(white_png(40, 30), DEFAULT_ASSET_TIMEOUT)
            .await
            .unwrap();
        assert_eq!((loaded.width(), loaded.height()), (40, 30));
        assert_eq!(loaded.mime, "image/png");
    }

    #[tokio::test]
    async fn export_keeps_native_size_and_draws_boxes() {
        let annotations = vec![Annotation::new(
            "Ausgang",
            "Exit",
            BoundingBox::new(100, 100, 500, 500),
        )];
        let artifact = export_composite(
            white_png(200, 200),
            &annotations,
            &OffsetStore::new(),
            &OverlayStyle::default(),
            &png_options(),
        )
        .await
        .unwrap();
        assert_eq!((artifact.width, artifact.height), (200, 200));
        assert_eq!(artifact.mime, "image/png");

        let out = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        // Left edge of the box at x=20, halfway down.
        let stroke = out.get_pixel(20, 60);
        assert_ne!(stroke, &Rgba([255, 255, 255, 255]));
        // Inside the box stays untouched.
        assert_eq!(out.get_pixel(60, 60), &Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn identical_annotations_leave_the_image_untouched() {
        let annotations = vec![Annotation::new("42", "42", BoundingBox::new(100, 100, 500, 500))];
        let artifact = export_composite(
            white_png(100, 100),
            &annotations,
            &OffsetStore::new(),
            &OverlayStyle::default(),
            &png_options(),
        )
        .await
        .unwrap();
        let out = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        assert!(out.pixels().all(|pixel| pixel == &Rgba([255, 255, 255, 255])));
    }

    #[tokio::test]
    async fn label_background_lands_at_offset_position() {
        let annotations = vec![Annotation::new(
            "Ausgang",
            "Exit",
            BoundingBox::new(100, 400, 200, 600),
        )];
        let mut offsets = OffsetStore::new();
        offsets.set(0, Offset::new(0.0, 300.0));
        let style = OverlayStyle::default();
        let loaded = load_source(white_png(500, 500), DEFAULT_ASSET_TIMEOUT)
            .await
            .unwrap();
        let layouts = native_layouts(&loaded, &annotations, &offsets, &style, LayoutOptions::default());
        let label = layouts[0].label_rect;
        let artifact = composite_loaded(&loaded, &annotations, &offsets, &style, &png_options()).unwrap();
        let out = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        // Label fill near the right end of the chip, clear of text and grip.
        let px = (label.right() - 1.5) as u32;
        let py = (label.y + label.h / 2.0) as u32;
        assert_eq!(out.get_pixel(px, py), &Rgba([0x11, 0x18, 0x27, 255]));
        // Default position (just below the box) stays white.
        let default_y = (100.0 + 2.0 + 5.0) as u32;
        assert_eq!(out.get_pixel(px, default_y), &Rgba([255, 255, 255, 255]));
    }
}
