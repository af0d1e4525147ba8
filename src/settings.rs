use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::export::ExportOptions;
use crate::font;
use crate::layout::{LabelStyle, LayoutOptions};
use crate::raster::{DEFAULT_JPEG_QUALITY, OutputFormat};
use crate::scene::OverlayStyle;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub accent_color: String,
    pub accent_opacity: f32,
    pub label_fill: String,
    pub text_color: String,
    pub handle_color: String,
    pub font_size: f32,
    pub font_family: Option<String>,
    pub font_path: Option<String>,
    pub avoid_overlaps: bool,
    pub export_format: String,
    pub export_quality: u8,
    pub asset_timeout: Duration,
    pub detect_model: Option<String>,
    pub edit_model: Option<String>,
    pub target_lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        let style = OverlayStyle::default();
        Self {
            accent_color: style.accent_color,
            accent_opacity: style.accent_opacity,
            label_fill: style.label_fill,
            text_color: style.text_color,
            handle_color: style.handle_color,
            font_size: style.label.font_size,
            font_family: None,
            font_path: None,
            avoid_overlaps: false,
            export_format: "jpeg".to_string(),
            export_quality: DEFAULT_JPEG_QUALITY,
            asset_timeout: crate::export::DEFAULT_ASSET_TIMEOUT,
            detect_model: None,
            edit_model: None,
            target_lang: "English".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    overlay: Option<OverlaySettings>,
    layout: Option<LayoutSettings>,
    export: Option<ExportSettings>,
    gemini: Option<GeminiSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    accent_color: Option<String>,
    accent_opacity: Option<f32>,
    label_fill: Option<String>,
    text_color: Option<String>,
    handle_color: Option<String>,
    font_size: Option<f32>,
    font_family: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    avoid_overlaps: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSettings {
    format: Option<String>,
    quality: Option<u8>,
    asset_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiSettings {
    detect_model: Option<String>,
    edit_model: Option<String>,
    target_lang: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_layered(&ordered_paths)
}

/// Later files override earlier ones key by key; missing files are skipped.
pub fn load_layered(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(overlay) = incoming.overlay {
            if let Some(color) = non_empty(overlay.accent_color) {
                self.accent_color = color;
            }
            if let Some(opacity) = overlay.accent_opacity {
                self.accent_opacity = opacity.clamp(0.0, 1.0);
            }
            if let Some(color) = non_empty(overlay.label_fill) {
                self.label_fill = color;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.text_color = color;
            }
            if let Some(color) = non_empty(overlay.handle_color) {
                self.handle_color = color;
            }
            if let Some(size) = overlay.font_size
                && size > 0.0
            {
                self.font_size = size;
            }
            if let Some(family) = non_empty(overlay.font_family) {
                self.font_family = Some(family);
            }
            if let Some(path) = non_empty(overlay.font_path) {
                self.font_path = Some(path);
            }
        }
        if let Some(layout) = incoming.layout
            && let Some(avoid) = layout.avoid_overlaps
        {
            self.avoid_overlaps = avoid;
        }
        if let Some(export) = incoming.export {
            if let Some(format) = non_empty(export.format) {
                self.export_format = format;
            }
            if let Some(quality) = export.quality {
                self.export_quality = quality.clamp(1, 100);
            }
            if let Some(secs) = export.asset_timeout_secs
                && secs > 0
            {
                self.asset_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(gemini) = incoming.gemini {
            if let Some(model) = non_empty(gemini.detect_model) {
                self.detect_model = Some(model);
            }
            if let Some(model) = non_empty(gemini.edit_model) {
                self.edit_model = Some(model);
            }
            if let Some(lang) = non_empty(gemini.target_lang) {
                self.target_lang = lang;
            }
        }
    }

    pub fn layout_options(&self) -> LayoutOptions {
        LayoutOptions {
            avoid_overlaps: self.avoid_overlaps,
        }
    }

    pub fn export_options(&self) -> Result<ExportOptions> {
        let format = OutputFormat::parse(&self.export_format, self.export_quality)
            .ok_or_else(|| anyhow!("unsupported export format '{}'", self.export_format))?;
        Ok(ExportOptions {
            format,
            asset_timeout: self.asset_timeout,
            layout: self.layout_options(),
        })
    }

    /// Style with the configured font resolved. Falls back to estimated text
    /// metrics when no font can be loaded.
    pub fn overlay_style(&self) -> OverlayStyle {
        let font_path = self.font_path.as_deref().map(Path::new);
        let resolved = font::resolve_font(
            font_path,
            self.font_family.as_deref(),
            font::fallback_fonts(),
        );
        let (font_family, font_metrics) = match resolved {
            Ok(resolved) => (Some(resolved.family), Some(resolved.metrics)),
            Err(err) => {
                warn!("using estimated text metrics: {}", err);
                (self.font_family.clone(), None)
            }
        };
        OverlayStyle {
            accent_color: self.accent_color.clone(),
            accent_opacity: self.accent_opacity,
            label_fill: self.label_fill.clone(),
            text_color: self.text_color.clone(),
            handle_color: self.handle_color.clone(),
            font_family,
            font_metrics,
            label: LabelStyle {
                font_size: self.font_size,
                ..LabelStyle::default()
            },
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".overlay-translator"))
        }
    })
}
