use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use overlay_translator::providers::ProviderFuture;
use overlay_translator::{
    Annotation, BoundingBox, DetectionOutcome, EditedImage, ExportOptions, Offset, OutputFormat,
    OverlayStyle, Session, SourceImage, VisionProvider,
};

#[derive(Clone)]
struct FixedProvider {
    annotations: Vec<Annotation>,
}

impl VisionProvider for FixedProvider {
    fn detect(&self, _image: &SourceImage, _target_lang: &str) -> ProviderFuture<Vec<Annotation>> {
        let annotations = self.annotations.clone();
        Box::pin(async move { Ok(annotations) })
    }

    fn edit(&self, image: &SourceImage, instruction: &str) -> ProviderFuture<EditedImage> {
        let edited = EditedImage {
            bytes: [image.bytes.as_slice(), instruction.as_bytes()].concat(),
            mime: image.mime.clone(),
        };
        Box::pin(async move { Ok(edited) })
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

#[tokio::test]
async fn empty_detection_reports_nothing_found_and_exports_plain_image() {
    let mut session = Session::new();
    session.upload(png(64, 48)).unwrap();
    let provider = FixedProvider {
        annotations: Vec::new(),
    };
    let outcome = overlay_translator::detect_into(&mut session, &provider, "English")
        .await
        .unwrap();
    assert_eq!(outcome, DetectionOutcome::NothingFound);

    let options = ExportOptions {
        format: OutputFormat::Png,
        ..ExportOptions::default()
    };
    let style = OverlayStyle::default();
    let artifact = overlay_translator::export_session(&session, &style, &options)
        .await
        .unwrap();
    let out = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
    assert!(out.pixels().all(|pixel| pixel == &Rgba([255, 255, 255, 255])));
}

#[tokio::test]
async fn redetection_invalidates_dragged_offsets() {
    let mut session = Session::new();
    session.upload(png(64, 48)).unwrap();
    let provider = FixedProvider {
        annotations: vec![Annotation::new(
            "Ausgang",
            "Exit",
            BoundingBox::new(100, 100, 200, 300),
        )],
    };
    overlay_translator::detect_into(&mut session, &provider, "English")
        .await
        .unwrap();
    session.move_label(0, Offset::new(40.0, 40.0)).unwrap();
    let outcome = overlay_translator::detect_into(&mut session, &provider, "English")
        .await
        .unwrap();
    assert_eq!(outcome, DetectionOutcome::Found(1));
    assert_eq!(session.offsets().get(0), Offset::ZERO);
}

#[tokio::test]
async fn edit_stores_processed_image_and_keeps_original() {
    let mut session = Session::new();
    let original = png(8, 8);
    session.upload(original.clone()).unwrap();
    let provider = FixedProvider {
        annotations: Vec::new(),
    };
    let edited = overlay_translator::edit_into(&mut session, &provider, "  make it blue ")
        .await
        .unwrap();
    assert!(edited.bytes.ends_with(b"make it blue"));
    assert_eq!(session.image().processed.as_ref(), Some(&edited));
    assert_eq!(
        session.image().original.as_ref().map(|image| &image.bytes),
        Some(&original)
    );
    assert!(
        overlay_translator::edit_into(&mut session, &provider, "   ")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn detection_without_upload_fails() {
    let mut session = Session::new();
    let provider = FixedProvider {
        annotations: Vec::new(),
    };
    assert!(
        overlay_translator::detect_into(&mut session, &provider, "English")
            .await
            .is_err()
    );
}
