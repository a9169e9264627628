//! Frame annotation: region outlines, region labels and the status banner.
//!
//! Text uses a built-in 5x7 block font (uppercase, digits and a little
//! punctuation); lowercase input is drawn uppercase.

use image::{Rgb, RgbImage};

use crate::detect::{ClassificationResult, Region};

pub const FREE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OCCUPIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BANNER_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const OUTLINE_THICKNESS: u32 = 2;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Annotated copy of `image`: one outline per region, coloured by occupancy,
/// its 1-based index, and a "Free: A/T" banner.
pub fn annotate(image: &RgbImage, regions: &[Region], results: &[ClassificationResult]) -> RgbImage {
    let mut out = image.clone();
    let mut free = 0;
    for (idx, (region, result)) in regions.iter().zip(results).enumerate() {
        let color = if result.occupied {
            OCCUPIED_COLOR
        } else {
            free += 1;
            FREE_COLOR
        };
        draw_outline(&mut out, region, color, OUTLINE_THICKNESS);
        let label = (idx + 1).to_string();
        draw_text(
            &mut out,
            &label,
            region.x.saturating_add(4),
            region.y.saturating_add(4),
            1,
            LABEL_COLOR,
        );
    }
    let banner = status_banner(free, regions.len());
    draw_text(&mut out, &banner, 20, 20, 3, BANNER_COLOR);
    out
}

pub fn status_banner(free: usize, total: usize) -> String {
    format!("Free: {free}/{total}")
}

/// Rectangle outline clipped to the image.
pub fn draw_outline(image: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    let (width, height) = image.dimensions();
    let x_end = region.right().min(width);
    let y_end = region.bottom().min(height);
    for y in region.y..y_end {
        for x in region.x..x_end {
            let on_edge = x < region.x + thickness
                || y < region.y + thickness
                || x + thickness >= region.right()
                || y + thickness >= region.bottom();
            if on_edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}

pub fn text_width(text: &str, scale: u32) -> u32 {
    (text.chars().count() as u32) * GLYPH_ADVANCE * scale
}

/// Draw `text` with its top-left corner at `(x, y)`; pixels off the image are dropped.
pub fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let scale = scale.max(1);
    for (pos, ch) in text.chars().enumerate() {
        let origin_x = x.saturating_add(pos as u32 * GLYPH_ADVANCE * scale);
        let rows = glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x.saturating_add(col * scale + dx);
                        let py = y.saturating_add(row as u32 * scale + dy);
                        if px < width && py < height {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; GLYPH_HEIGHT as usize] {
    match ch.to_ascii_uppercase() {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
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
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
