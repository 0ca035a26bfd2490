use std::f64::consts::PI;
use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::warn;

use super::{Annotation, Shape, DEFAULT_COLOR};
use crate::error::Result;
use crate::geometry::{Point, Rect};

pub const LINE_WIDTH: f64 = 3.0;
pub const ARROW_HEAD_LEN: f64 = 15.0;
pub const HIGHLIGHT_ALPHA: f64 = 0.3;
pub const TEXT_SIZE: u32 = 16;

const GLYPH_PX: u32 = 8;

/// Decode `screenshot` and draw `annotations` over it in list order.
///
/// Returns `None` when the screenshot is not a decodable image; the caller
/// keeps working without a preview.
pub fn compose(screenshot: &[u8], annotations: &[Annotation]) -> Option<RgbaImage> {
    let base = match image::load_from_memory(screenshot) {
        Ok(img) => img,
        Err(err) => {
            warn!("screenshot could not be decoded, skipping render: {err}");
            return None;
        }
    };
    let mut rendered = base.to_rgba8();
    draw_annotations(&mut rendered, annotations);
    Some(rendered)
}

pub fn draw_annotations<'a, I>(img: &mut RgbaImage, annotations: I)
where
    I: IntoIterator<Item = &'a Annotation>,
{
    for ann in annotations {
        draw_annotation(img, ann);
    }
}

pub fn draw_annotation(img: &mut RgbaImage, ann: &Annotation) {
    let color = parse_color(&ann.color);
    match &ann.shape {
        Shape::Box { .. } => {
            if let Some(rect) = ann.rect() {
                stroke_rect(img, rect, color, LINE_WIDTH);
            }
        }
        Shape::Highlight { .. } => {
            if let Some(rect) = ann.rect() {
                let [r, g, b, a] = color.0;
                let alpha = (f64::from(a) * HIGHLIGHT_ALPHA).round() as u8;
                fill_rect_alpha(img, rect, Rgba([r, g, b, alpha]));
            }
        }
        Shape::Arrow { end_x, end_y } => {
            draw_arrow(img, ann.origin(), Point::new(*end_x, *end_y), color);
        }
        Shape::Text { text } => {
            let scale = TEXT_SIZE / GLYPH_PX;
            let top = ann.y.round() as i32 - TEXT_SIZE as i32;
            draw_bitmap_text(img, ann.x.round() as i32, top, text, color, scale);
        }
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone()).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Width and height of `text` at the fixed annotation font size.
pub fn text_extent(text: &str) -> (f64, f64) {
    let chars = text.chars().count() as f64;
    (chars * f64::from(TEXT_SIZE), f64::from(TEXT_SIZE))
}

/// Accepts `#rrggbb`, `#rrggbbaa` and `rgba(r, g, b, a)`. Anything else
/// falls back to the default palette color.
pub fn parse_color(raw: &str) -> Rgba<u8> {
    parse_color_opt(raw)
        .or_else(|| parse_color_opt(DEFAULT_COLOR))
        .unwrap_or(Rgba([239, 68, 68, 255]))
}

pub fn parse_color_opt(raw: &str) -> Option<Rgba<u8>> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
            8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
            _ => None,
        };
    }

    let lower = s.to_ascii_lowercase();
    let body = lower.strip_prefix("rgba(")?.strip_suffix(')')?;
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return None;
    }
    let byte = |v: &str| -> Option<u8> {
        Some(v.parse::<f64>().ok()?.round().clamp(0.0, 255.0) as u8)
    };
    let alpha_value = parts[3].parse::<f64>().ok()?;
    let a = if alpha_value <= 1.0 {
        (alpha_value * 255.0).round().clamp(0.0, 255.0) as u8
    } else {
        alpha_value.round().clamp(0.0, 255.0) as u8
    };
    Some(Rgba([byte(parts[0])?, byte(parts[1])?, byte(parts[2])?, a]))
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * (1.0 - f64::from(dst[3]) / 255.0))
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn blend_at(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let dst = *img.get_pixel(x as u32, y as u32);
    img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
}

fn fill_rect_alpha(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    // pixel (x, y) is covered when its center lies inside the rect
    let x0 = clamp_i32((rect.x - 0.5).ceil() as i32, 0, img.width() as i32);
    let x1 = clamp_i32((rect.right() - 0.5).ceil() as i32, 0, img.width() as i32);
    let y0 = clamp_i32((rect.y - 0.5).ceil() as i32, 0, img.height() as i32);
    let y1 = clamp_i32((rect.bottom() - 0.5).ceil() as i32, 0, img.height() as i32);
    for y in y0..y1 {
        for x in x0..x1 {
            blend_at(img, x, y, color);
        }
    }
}

/// Stroke centered on the rectangle edge, like a 2D canvas `strokeRect`.
fn stroke_rect(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>, width: f64) {
    let half = width / 2.0;
    let outer = rect.inflate(half);
    let band = |x: f64, y: f64, w: f64, h: f64| Rect::new(x, y, w, h);
    let top = band(outer.x, outer.y, outer.width, width);
    let bottom = band(outer.x, rect.bottom() - half, outer.width, width);
    let inner_h = (outer.height - width * 2.0).max(0.0);
    let left = band(outer.x, outer.y + width, width, inner_h);
    let right = band(rect.right() - half, outer.y + width, width, inner_h);
    for edge in [top, bottom, left, right] {
        fill_rect_alpha(img, edge, color);
    }
}

fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let min_x = (cx - radius).floor() as i32;
    let max_x = (cx + radius).ceil() as i32;
    let min_y = (cy - radius).floor() as i32;
    let max_y = (cy + radius).ceil() as i32;
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

/// Clip the segment to `[min, max]` on both axes (Liang-Barsky). `None` when
/// nothing of it lies inside.
fn clip_segment(from: Point, to: Point, min: Point, max: Point) -> Option<(Point, Point)> {
    if ![from.x, from.y, to.x, to.y].iter().all(|v| v.is_finite()) {
        return None;
    }
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let edges = [
        (-dx, from.x - min.x),
        (dx, max.x - from.x),
        (-dy, from.y - min.y),
        (dy, max.y - from.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        Point::new(from.x + dx * t0, from.y + dy * t0),
        Point::new(from.x + dx * t1, from.y + dy * t1),
    ))
}

fn draw_thick_line(img: &mut RgbaImage, from: Point, to: Point, color: Rgba<u8>, width: f64) {
    let pad = width.max(1.0);
    let bounds_max = Point::new(f64::from(img.width()) + pad, f64::from(img.height()) + pad);
    let Some((from, to)) = clip_segment(from, to, Point::new(-pad, -pad), bounds_max) else {
        return;
    };
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let distance = (dx * dx + dy * dy).sqrt();
    let steps = distance.max(1.0).ceil() as i32;
    let radius = (width.max(1.0) / 2.0).max(0.6);
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps.max(1));
        draw_disc(img, from.x + dx * t, from.y + dy * t, radius, color);
    }
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    ((a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1)).abs()) / 2.0
}

fn point_in_triangle(p: (f64, f64), a: (f64, f64), b: (f64, f64), c: (f64, f64), eps: f64) -> bool {
    let total = triangle_area(a, b, c);
    if total <= eps {
        return false;
    }
    let a1 = triangle_area(p, b, c);
    let a2 = triangle_area(a, p, c);
    let a3 = triangle_area(a, b, p);
    (a1 + a2 + a3 - total).abs() <= eps
}

fn fill_triangle(img: &mut RgbaImage, a: (f64, f64), b: (f64, f64), c: (f64, f64), color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(a.0.min(b.0).min(c.0).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32(a.0.max(b.0).max(c.0).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32(a.1.min(b.1).min(c.1).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32(a.1.max(b.1).max(c.1).ceil() as i32, 0, img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            if point_in_triangle(p, a, b, c, 0.8) {
                blend_at(img, x, y, color);
            }
        }
    }
}

/// The two back corners of an arrowhead at `to`, rotated +-30 degrees off the
/// shaft.
pub fn arrow_head(from: Point, to: Point) -> (Point, Point) {
    let angle = (to.y - from.y).atan2(to.x - from.x);
    let wing = |offset: f64| {
        Point::new(
            to.x - ARROW_HEAD_LEN * (angle + offset).cos(),
            to.y - ARROW_HEAD_LEN * (angle + offset).sin(),
        )
    };
    (wing(-PI / 6.0), wing(PI / 6.0))
}

fn draw_arrow(img: &mut RgbaImage, from: Point, to: Point, color: Rgba<u8>) {
    draw_thick_line(img, from, to, color, LINE_WIDTH);
    let (left, right) = arrow_head(from, to);
    fill_triangle(img, (to.x, to.y), (left.x, left.y), (right.x, right.y), color);
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let advance = GLYPH_PX as i32 * scale_i;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += advance;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..GLYPH_PX as i32 {
                if (row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        blend_at(img, px + sx, py + sy, color);
                    }
                }
            }
        }
        cursor_x += advance;
    }
}
