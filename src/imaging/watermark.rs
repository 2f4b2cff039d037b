//! Text watermark compositing.
//!
//! The watermark is drawn onto a transparent RGBA layer the size of the
//! image (translucent backing box first, then the glyphs) and the layer is
//! alpha-composited over a copy of the input. The input buffer is never
//! modified, and the result keeps the input's dimensions and color mode.
//!
//! Glyphs come from the first [`FontSource`] that loads: a user font file,
//! then common system fonts, then a built-in 5x7 bitmap face that always
//! works. Outline fonts are rasterized with `ab_glyph`.

use super::calculations::{watermark_font_size, watermark_origin, watermark_padding};
use super::params::WatermarkPosition;
use ab_glyph::{Font, FontVec, GlyphId, PxScale, ScaleFont, point};
use image::{ColorType, DynamicImage, Pixel, Rgba, RgbaImage, imageops};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Text fill: white at ~85% opacity.
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 217]);
/// Backing box: black at 50% opacity.
const BOX_COLOR: Rgba<u8> = Rgba([0, 0, 0, 128]);

/// Font files tried when the user does not name one.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Where a watermark face may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    File(PathBuf),
    Builtin,
}

/// The ordered source list: `user_font` first, then system fonts, then the
/// built-in bitmap face.
pub fn font_sources(user_font: Option<&Path>) -> Vec<FontSource> {
    user_font
        .map(|p| FontSource::File(p.to_path_buf()))
        .into_iter()
        .chain(
            SYSTEM_FONT_PATHS
                .iter()
                .map(|p| FontSource::File(PathBuf::from(p))),
        )
        .chain(std::iter::once(FontSource::Builtin))
        .collect()
}

/// A loaded typeface.
pub enum Face {
    Outline(FontVec),
    Bitmap,
}

impl std::fmt::Debug for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Face::Outline(_) => f.write_str("Face::Outline"),
            Face::Bitmap => f.write_str("Face::Bitmap"),
        }
    }
}

impl Face {
    /// Load the first usable face from `sources`. Never fails: the bitmap
    /// face is the fallback even when `Builtin` is not listed.
    pub fn load(sources: &[FontSource]) -> Face {
        for source in sources {
            match source {
                FontSource::Builtin => return Face::Bitmap,
                FontSource::File(path) => {
                    let Ok(bytes) = std::fs::read(path) else {
                        continue;
                    };
                    match FontVec::try_from_vec(bytes) {
                        Ok(font) => {
                            debug!(font = %path.display(), "loaded watermark font");
                            return Face::Outline(font);
                        }
                        Err(_) => debug!(font = %path.display(), "not a usable font file"),
                    }
                }
            }
        }
        Face::Bitmap
    }

    /// Process-wide face for the default source list, loaded on first use.
    pub fn system() -> &'static Face {
        static SYSTEM: OnceLock<Face> = OnceLock::new();
        SYSTEM.get_or_init(|| Face::load(&font_sources(None)))
    }

    /// Rendered (width, height) of `text` at `size` pixels.
    pub fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        if text.is_empty() {
            return (0, 0);
        }
        match self {
            Face::Outline(font) => {
                let scaled = font.as_scaled(PxScale::from(size as f32));
                let mut width = 0.0f32;
                let mut prev: Option<GlyphId> = None;
                for c in text.chars() {
                    let id = scaled.glyph_id(c);
                    if let Some(p) = prev {
                        width += scaled.kern(p, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }
                (width.ceil() as u32, scaled.height().ceil() as u32)
            }
            Face::Bitmap => bitmap::measure(text, size),
        }
    }

    fn draw(&self, layer: &mut RgbaImage, text: &str, size: u32, origin: (i64, i64)) {
        match self {
            Face::Outline(font) => draw_outline(font, layer, text, size, origin),
            Face::Bitmap => bitmap::draw(layer, text, size, origin),
        }
    }
}

/// Placement and look of a watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkStyle {
    pub position: WatermarkPosition,
    /// `None` picks [`watermark_font_size`] from the image width.
    pub font_size: Option<u32>,
    /// Draw the translucent backing box behind the text.
    pub background: bool,
}

impl Default for WatermarkStyle {
    fn default() -> Self {
        Self {
            position: WatermarkPosition::default(),
            font_size: None,
            background: true,
        }
    }
}

/// Overlay `text` on a copy of `image` using the system face and a backing box.
pub fn apply(
    image: &DynamicImage,
    text: &str,
    position: WatermarkPosition,
    font_size: Option<u32>,
) -> DynamicImage {
    let style = WatermarkStyle {
        position,
        font_size,
        background: true,
    };
    apply_with(image, text, &style, Face::system())
}

/// Overlay `text` on a copy of `image` with an explicit style and face.
pub fn apply_with(
    image: &DynamicImage,
    text: &str,
    style: &WatermarkStyle,
    face: &Face,
) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if text.is_empty() || width == 0 || height == 0 {
        return image.clone();
    }

    let size = style
        .font_size
        .unwrap_or_else(|| watermark_font_size(width))
        .max(1);
    let padding = watermark_padding(width);
    let text_dims = face.measure(text, size);
    let origin = watermark_origin((width, height), text_dims, padding, style.position);

    let mut layer = RgbaImage::new(width, height);
    if style.background {
        let pad = (padding / 2).max(1) as i64;
        fill_rect(
            &mut layer,
            (origin.0 - pad, origin.1 - pad),
            (text_dims.0 as i64 + 2 * pad, text_dims.1 as i64 + 2 * pad),
            BOX_COLOR,
        );
    }
    face.draw(&mut layer, text, size, origin);

    let mut base = image.to_rgba8();
    imageops::overlay(&mut base, &layer, 0, 0);
    restore_color(base, image.color())
}

/// Convert the composited RGBA buffer back to the input's color mode.
fn restore_color(base: RgbaImage, color: ColorType) -> DynamicImage {
    let rgba = DynamicImage::ImageRgba8(base);
    match color {
        ColorType::Rgba8 => rgba,
        ColorType::Rgb8 => DynamicImage::ImageRgb8(rgba.to_rgb8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(rgba.to_luma_alpha8()),
        ColorType::L8 => DynamicImage::ImageLuma8(rgba.to_luma8()),
        c if c.has_alpha() => rgba,
        _ => DynamicImage::ImageRgb8(rgba.to_rgb8()),
    }
}

/// Blend `color` over the layer pixel at (x, y), ignoring out-of-bounds writes.
fn blend_at(layer: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= layer.width() as i64 || y >= layer.height() as i64 {
        return;
    }
    layer.get_pixel_mut(x as u32, y as u32).blend(&color);
}

fn fill_rect(layer: &mut RgbaImage, origin: (i64, i64), size: (i64, i64), color: Rgba<u8>) {
    let x0 = origin.0.max(0);
    let y0 = origin.1.max(0);
    let x1 = (origin.0 + size.0).min(layer.width() as i64);
    let y1 = (origin.1 + size.1).min(layer.height() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            blend_at(layer, x, y, color);
        }
    }
}

fn draw_outline(font: &FontVec, layer: &mut RgbaImage, text: &str, size: u32, origin: (i64, i64)) {
    let scale = PxScale::from(size as f32);
    let scaled = font.as_scaled(scale);
    let baseline = origin.1 as f32 + scaled.ascent();
    let mut cursor = origin.0 as f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        let glyph = id.with_scale_and_position(scale, point(cursor, baseline));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let alpha = (coverage.clamp(0.0, 1.0) * TEXT_COLOR[3] as f32) as u8;
                let [r, g, b, _] = TEXT_COLOR.0;
                blend_at(
                    layer,
                    bounds.min.x as i64 + px as i64,
                    bounds.min.y as i64 + py as i64,
                    Rgba([r, g, b, alpha]),
                );
            });
        }
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }
}

/// Built-in 5x7 face. Lowercase letters render as uppercase; characters
/// without a glyph render as a hollow box.
mod bitmap {
    use super::{TEXT_COLOR, blend_at};
    use image::RgbaImage;

    const GLYPH_W: u32 = 5;
    const GLYPH_H: u32 = 7;
    const ADVANCE: u32 = GLYPH_W + 1;
    const MISSING: [u8; 7] = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F];

    /// Pixel multiplier so the cell height tracks the requested size.
    fn cell_scale(size: u32) -> u32 {
        ((size as f64 / GLYPH_H as f64).round() as u32).max(1)
    }

    pub(super) fn measure(text: &str, size: u32) -> (u32, u32) {
        let k = cell_scale(size);
        let count = text.chars().count() as u32;
        ((count * ADVANCE - 1) * k, GLYPH_H * k)
    }

    pub(super) fn draw(layer: &mut RgbaImage, text: &str, size: u32, origin: (i64, i64)) {
        let k = cell_scale(size) as i64;
        for (i, c) in text.chars().enumerate() {
            let rows = glyph(c);
            let gx = origin.0 + i as i64 * ADVANCE as i64 * k;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    let px = gx + col as i64 * k;
                    let py = origin.1 + row as i64 * k;
                    for dy in 0..k {
                        for dx in 0..k {
                            blend_at(layer, px + dx, py + dy, TEXT_COLOR);
                        }
                    }
                }
            }
        }
    }

    pub(super) fn glyph(c: char) -> [u8; 7] {
        match c.to_ascii_uppercase() {
            ' ' => [0; 7],
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
            'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
            'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
            'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
            'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
            'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
            'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
            'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
            'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
            'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
            'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
            ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
            '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
            '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
            '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
            '\'' => [0x0C, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
            '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
            ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
            '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
            '@' => [0x0E, 0x11, 0x01, 0x0D, 0x15, 0x15, 0x0E],
            '©' => [0x0E, 0x11, 0x17, 0x19, 0x17, 0x11, 0x0E],
            _ => MISSING,
        }
    }
}
