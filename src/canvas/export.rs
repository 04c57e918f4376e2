//! Rasterizes a canvas render plan into a PNG.
//!
//! Every image is drawn through the affine
//! `scale(pixel_ratio) · translate(pos) · rotate(rotation°) · scale(scale)`
//! with `vello_cpu`. Each layer is an opacity layer of the render context,
//! so layer opacity applies to the composited layer. The background stays
//! transparent.

use base64::Engine;
use image::RgbaImage;
use kurbo::{Affine, Rect};
use std::io::Cursor;
use vello_cpu::peniko::Extend;
use vello_cpu::peniko::color::{Srgb, parse_color as parse_css_color};
use vello_cpu::{Pixmap, RenderContext};

use super::source::ImageSource;
use crate::error::CollageError;
use crate::types::canvas::{CanvasSize, ImageStyle, PatternRepeat, Position};

pub use vello_cpu::peniko::Color;

/// Largest output side accepted by [`render`].
pub const MAX_EXPORT_SIDE: u32 = 16_384;

pub const EXPORT_FILE_NAME: &str = "collage.png";

/// Immutable snapshot of everything the exporter draws.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub size: CanvasSize,
    /// Visible layers, bottom first.
    pub layers: Vec<RenderLayer>,
}

#[derive(Debug, Clone)]
pub struct RenderLayer {
    pub opacity: f64,
    /// Bottom first.
    pub items: Vec<RenderItem>,
}

#[derive(Debug, Clone)]
pub struct RenderItem {
    pub source: ImageSource,
    /// Image space → canvas space.
    pub transform: Affine,
    pub opacity: f64,
    pub fill: Option<Fill>,
}

/// Paint laid under the bitmap inside its rectangle.
#[derive(Debug, Clone)]
pub enum Fill {
    Color(Color),
    Pattern {
        source: ImageSource,
        x: f64,
        y: f64,
        repeat: PatternRepeat,
    },
}

pub fn image_transform(pos: Position, style: &ImageStyle) -> Affine {
    Affine::translate((pos.x, pos.y))
        * Affine::rotate(style.rotation.to_radians())
        * Affine::scale(style.scale)
}

pub fn render(plan: &RenderPlan, pixel_ratio: f64) -> Result<RgbaImage, CollageError> {
    if !pixel_ratio.is_finite() || pixel_ratio <= 0.0 {
        return Err(CollageError::InvalidRequest(format!(
            "pixel ratio must be positive, got {pixel_ratio}"
        )));
    }
    let width = (f64::from(plan.size.width) * pixel_ratio).round() as u32;
    let height = (f64::from(plan.size.height) * pixel_ratio).round() as u32;
    if width == 0 || height == 0 || width > MAX_EXPORT_SIDE || height > MAX_EXPORT_SIDE {
        return Err(CollageError::InvalidRequest(format!(
            "export size {width}x{height} out of range"
        )));
    }
    // Bounded by MAX_EXPORT_SIDE above.
    let (w, h) = (width as u16, height as u16);

    let mut ctx = RenderContext::new(w, h);
    let view = Affine::scale(pixel_ratio);
    for layer in &plan.layers {
        if layer.items.is_empty() || layer.opacity <= 0.0 {
            continue;
        }
        ctx.push_opacity_layer(layer.opacity.min(1.0) as f32);
        for item in &layer.items {
            draw_item(&mut ctx, view * item.transform, item);
        }
        ctx.pop_layer();
    }
    ctx.flush();

    let mut pixmap = Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);
    let rgba = pixmap
        .take_unpremultiplied()
        .into_iter()
        .flat_map(|px| [px.r, px.g, px.b, px.a])
        .collect();
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| CollageError::InvalidRequest("export buffer size mismatch".to_string()))
}

pub fn encode_png(img: RgbaImage) -> Result<Vec<u8>, CollageError> {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

pub fn render_png(plan: &RenderPlan, pixel_ratio: f64) -> Result<Vec<u8>, CollageError> {
    encode_png(render(plan, pixel_ratio)?)
}

pub fn to_data_uri(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

fn draw_item(ctx: &mut RenderContext, transform: Affine, item: &RenderItem) {
    if item.opacity <= 0.0 || transform.determinant().abs() < 1e-12 {
        return;
    }
    let bounds = Rect::new(
        0.0,
        0.0,
        f64::from(item.source.width()),
        f64::from(item.source.height()),
    );

    ctx.set_transform(to_cpu_affine(transform));
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    let faded = item.opacity < 1.0;
    if faded {
        ctx.push_opacity_layer(item.opacity as f32);
    }

    match &item.fill {
        Some(Fill::Color(color)) => {
            ctx.set_paint(*color);
            ctx.fill_rect(&to_cpu_rect(bounds));
        }
        Some(Fill::Pattern {
            source,
            x,
            y,
            repeat,
        }) => {
            if let Some(area) = pattern_area(bounds, source, *x, *y, *repeat) {
                let (x_extend, y_extend) = pattern_extends(*repeat);
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::translate((*x, *y)));
                ctx.set_paint(source.paint_with(x_extend, y_extend));
                ctx.fill_rect(&to_cpu_rect(area));
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            }
        }
        None => {}
    }

    ctx.set_paint(item.source.paint());
    ctx.fill_rect(&to_cpu_rect(bounds));

    if faded {
        ctx.pop_layer();
    }
}

fn pattern_extends(repeat: PatternRepeat) -> (Extend, Extend) {
    match repeat {
        PatternRepeat::Repeat => (Extend::Repeat, Extend::Repeat),
        PatternRepeat::RepeatX => (Extend::Repeat, Extend::Pad),
        PatternRepeat::RepeatY => (Extend::Pad, Extend::Repeat),
        PatternRepeat::NoRepeat => (Extend::Pad, Extend::Pad),
    }
}

/// Part of the image rectangle covered by the pattern. Non-repeating axes
/// are limited to a single tile at the pattern offset.
fn pattern_area(
    bounds: Rect,
    source: &ImageSource,
    x: f64,
    y: f64,
    repeat: PatternRepeat,
) -> Option<Rect> {
    let (x_extend, y_extend) = pattern_extends(repeat);
    let mut tile = bounds;
    if x_extend != Extend::Repeat {
        tile.x0 = x;
        tile.x1 = x + f64::from(source.width());
    }
    if y_extend != Extend::Repeat {
        tile.y0 = y;
        tile.y1 = y + f64::from(source.height());
    }
    let area = bounds.intersect(tile);
    (area.width() > 0.0 && area.height() > 0.0).then_some(area)
}

fn to_cpu_affine(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn to_cpu_rect(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

/// Parse a CSS colour (hex, `rgb()`, `hsl()`, named colours).
pub fn parse_color(s: &str) -> Option<Color> {
    parse_css_color(s.trim())
        .ok()
        .map(|c| c.to_alpha_color::<Srgb>())
}
