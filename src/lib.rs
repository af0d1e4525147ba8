use anyhow::{Result, anyhow};

pub mod annotation;
pub mod error;
pub mod export;
pub mod font;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod offsets;
pub mod overlay;
pub mod providers;
mod raster;
mod scene;
pub mod server;
pub mod settings;
pub mod state;

pub use annotation::{Annotation, BoundingBox};
pub use error::CompositeError;
pub use export::{ExportArtifact, ExportOptions, LoadedImage, export_composite, load_source};
pub use layout::{
    Canvas, LabelLayout, LabelStyle, LayoutOptions, compute_layout, compute_layouts,
};
pub use offsets::{Offset, OffsetStore};
pub use overlay::{DragController, OverlayScene, OverlayView};
pub use providers::{EditedImage, Gemini, VisionProvider};
pub use raster::OutputFormat;
pub use scene::OverlayStyle;
pub use state::{DetectionOutcome, ImageState, Mode, Session, SourceImage};

/// Wraps raw bytes with their sniffed image mime.
pub fn source_image(bytes: Vec<u8>) -> Result<SourceImage> {
    let mime = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .ok_or_else(|| anyhow!("input is not a recognized image"))?
        .to_string();
    Ok(SourceImage { bytes, mime })
}

pub fn build_gemini(settings: &settings::Settings, key: Option<&str>) -> Result<Gemini> {
    let key = providers::resolve_key(key)?;
    let mut gemini = Gemini::new(key);
    if let Some(model) = settings.detect_model.as_deref() {
        gemini = gemini.with_detect_model(model);
    }
    if let Some(model) = settings.edit_model.as_deref() {
        gemini = gemini.with_edit_model(model);
    }
    Ok(gemini)
}

/// Runs detection for the session's current upload and stores the result.
pub async fn detect_into<P: VisionProvider>(
    session: &mut Session,
    provider: &P,
    target_lang: &str,
) -> Result<DetectionOutcome> {
    let image = session
        .image()
        .original
        .clone()
        .ok_or_else(|| anyhow!("no image uploaded"))?;
    let annotations = provider.detect(&image, target_lang).await?;
    Ok(session.apply_detection(annotations))
}

/// Sends the session's upload to the editing model and stores the result.
pub async fn edit_into<P: VisionProvider>(
    session: &mut Session,
    provider: &P,
    instruction: &str,
) -> Result<EditedImage> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(anyhow!("instruction is empty"));
    }
    let image = session
        .image()
        .original
        .clone()
        .ok_or_else(|| anyhow!("no image uploaded"))?;
    let edited = provider.edit(&image, instruction).await?;
    session.apply_edit(edited.clone());
    Ok(edited)
}

/// Composite of the session's upload with its current annotations and offsets.
pub async fn export_session(
    session: &Session,
    style: &OverlayStyle,
    options: &ExportOptions,
) -> Result<ExportArtifact> {
    let image = session
        .image()
        .original
        .as_ref()
        .ok_or_else(|| anyhow!("no image uploaded"))?;
    let artifact = export_composite(
        image.bytes.clone(),
        session.annotations(),
        session.offsets(),
        style,
        options,
    )
    .await?;
    Ok(artifact)
}
