use anyhow::{Context, Result, anyhow};
use image::ImageReader;
use std::io::Cursor;
use tracing::{debug, info};

use crate::annotation::Annotation;
use crate::offsets::{Offset, OffsetStore};
use crate::providers::EditedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Translate,
    Studio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImageState {
    pub original: Option<SourceImage>,
    pub processed: Option<EditedImage>,
    pub annotations: Vec<Annotation>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    Found(usize),
    NothingFound,
}

/// One uploaded image with its detection results and label offsets.
#[derive(Debug, Default)]
pub struct Session {
    image: ImageState,
    offsets: OffsetStore,
    mode: Mode,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> &ImageState {
        &self.image
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.image.annotations
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    pub fn offsets_mut(&mut self) -> &mut OffsetStore {
        &mut self.offsets
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Discards everything from the previous image and reads the new one's size.
    pub fn upload(&mut self, bytes: Vec<u8>) -> Result<()> {
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .filter(|mime| mime.starts_with("image/"))
            .ok_or_else(|| anyhow!("upload is not a recognized image"))?
            .to_string();
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .with_context(|| "failed to read image header")?
            .into_dimensions()
            .with_context(|| "failed to read image dimensions")?;
        info!("uploaded {} image {}x{}", mime, width, height);
        self.reset();
        self.image = ImageState {
            original: Some(SourceImage { bytes, mime }),
            processed: None,
            annotations: Vec::new(),
            width,
            height,
        };
        Ok(())
    }

    /// Replaces the annotation list; offsets recorded against the old list
    /// no longer point at the same regions and are dropped.
    pub fn apply_detection(&mut self, annotations: Vec<Annotation>) -> DetectionOutcome {
        self.offsets.clear();
        self.image.annotations = annotations;
        let count = self.image.annotations.len();
        debug!("detection stored {} annotation(s)", count);
        if count == 0 {
            DetectionOutcome::NothingFound
        } else {
            DetectionOutcome::Found(count)
        }
    }

    pub fn apply_edit(&mut self, edited: EditedImage) {
        self.image.processed = Some(edited);
    }

    pub fn edit_translation(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        let annotation = self
            .image
            .annotations
            .get_mut(index)
            .ok_or_else(|| anyhow!("no annotation at index {}", index))?;
        annotation.translation = text.into();
        Ok(())
    }

    pub fn move_label(&mut self, index: usize, offset: Offset) -> Result<()> {
        if index >= self.image.annotations.len() {
            return Err(anyhow!("no annotation at index {}", index));
        }
        self.offsets.set(index, offset);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.image = ImageState::default();
        self.offsets.clear();
    }
}
