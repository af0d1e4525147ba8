use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::font::{FontMetrics, center_baseline_offset};
use crate::layout::{Canvas, LabelLayout, LabelStyle};

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub accent_color: String,
    pub accent_opacity: f32,
    pub label_fill: String,
    pub text_color: String,
    pub handle_color: String,
    pub font_family: Option<String>,
    pub font_metrics: Option<FontMetrics>,
    pub label: LabelStyle,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            accent_color: "#ff3b30".to_string(),
            accent_opacity: 0.75,
            label_fill: "#111827".to_string(),
            text_color: "#ffffff".to_string(),
            handle_color: "#9ca3af".to_string(),
            font_family: None,
            font_metrics: None,
            label: LabelStyle::default(),
        }
    }
}

impl OverlayStyle {
    pub fn font(&self) -> Option<&FontMetrics> {
        self.font_metrics.as_ref()
    }

    fn family(&self) -> Option<&str> {
        self.font_family
            .as_deref()
            .or_else(|| self.font_metrics.as_ref().and_then(|m| m.family()))
    }
}

pub(crate) fn data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Base image at canvas size (when given), then box, label background, grip
/// and text for each layout in order. `interactive` tags labels by index.
pub(crate) fn build_svg(
    image_href: Option<&str>,
    canvas: Canvas,
    layouts: &[LabelLayout],
    style: &OverlayStyle,
    interactive: bool,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = canvas.width,
        h = canvas.height
    ));
    if let Some(uri) = image_href {
        svg.push_str(&format!(
            r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
            uri = escape_xml(uri),
            w = canvas.width,
            h = canvas.height
        ));
    }

    for layout in layouts {
        push_box(&mut svg, layout, style);
        push_label(&mut svg, layout, style, interactive);
    }

    svg.push_str("</svg>");
    svg
}

fn push_box(svg: &mut String, layout: &LabelLayout, style: &OverlayStyle) {
    let rect = layout.box_rect;
    svg.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{stroke}" stroke-opacity="{opacity}" stroke-width="{sw}"/>"#,
        x = rect.x,
        y = rect.y,
        w = rect.w,
        h = rect.h,
        stroke = escape_xml(&style.accent_color),
        opacity = style.accent_opacity,
        sw = layout.metrics.stroke_width
    ));
}

fn push_label(svg: &mut String, layout: &LabelLayout, style: &OverlayStyle, interactive: bool) {
    let rect = layout.label_rect;
    let metrics = layout.metrics;
    if interactive {
        svg.push_str(&format!(r#"<g class="label" data-index="{}">"#, layout.index));
    } else {
        svg.push_str("<g>");
    }
    svg.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/>"#,
        x = rect.x,
        y = rect.y,
        w = rect.w,
        h = rect.h,
        fill = escape_xml(&style.label_fill)
    ));

    let center_y = rect.y + rect.h / 2.0;
    let grip_x = rect.x + metrics.handle_width / 2.0;
    let dx = metrics.handle_width * 0.15;
    let dy = metrics.font_size * 0.25;
    let radius = metrics.handle_width * 0.07;
    for col in [-dx, dx] {
        for row in [-dy, 0.0, dy] {
            svg.push_str(&format!(
                r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{fill}"/>"#,
                cx = grip_x + col,
                cy = center_y + row,
                r = radius,
                fill = escape_xml(&style.handle_color)
            ));
        }
    }

    let text_x = rect.x + metrics.handle_width + metrics.padding_x;
    let baseline = center_y + center_baseline_offset(metrics.font_size, style.font());
    let family = style
        .family()
        .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
        .unwrap_or_default();
    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}"{family}>{text}</text>"#,
        x = text_x,
        y = baseline,
        size = metrics.font_size,
        color = escape_xml(&style.text_color),
        family = family,
        text = escape_xml(&layout.text)
    ));
    svg.push_str("</g>");
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
