use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap};
use usvg::{Options, Tree, fontdb};

use crate::error::CompositeError;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl OutputFormat {
    pub fn parse(name: &str, quality: u8) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "image/jpeg" => Some(OutputFormat::Jpeg {
                quality: quality.clamp(1, 100),
            }),
            "png" | "image/png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Draws `overlay_svg` over `base`; the SVG must share the base's pixel size.
pub(crate) fn composite(
    base: &RgbaImage,
    overlay_svg: &str,
    font_data: Option<&[u8]>,
) -> Result<RgbaImage, CompositeError> {
    let (width, height) = base.dimensions();
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| CompositeError::Render("empty canvas".to_string()))?;
    let mut pixmap = Pixmap::from_vec(premultiply(base), size)
        .ok_or_else(|| CompositeError::Render("failed to allocate canvas".to_string()))?;

    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(overlay_svg, &options)
        .map_err(|err| CompositeError::Render(format!("invalid overlay SVG: {}", err)))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    let data = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect::<Vec<u8>>();
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| CompositeError::Render("failed to build image buffer".to_string()))
}

pub(crate) fn encode(image: RgbaImage, format: OutputFormat) -> Result<Vec<u8>, CompositeError> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            rgb.write_with_encoder(encoder)
                .map_err(|err| CompositeError::Encode(err.to_string()))?;
        }
        OutputFormat::Png => {
            let mut cursor = Cursor::new(&mut bytes);
            DynamicImage::ImageRgba8(image)
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|err| CompositeError::Encode(err.to_string()))?;
        }
    }
    Ok(bytes)
}

fn premultiply(image: &RgbaImage) -> Vec<u8> {
    let mut data = image.as_raw().clone();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
    data
}
