// src/composition/overlay.rs - timestamp label burned into each frame

use image::RgbImage;

/// Box behind the label: 10 px from the left, 40 px above the bottom edge
pub const BOX_X: u32 = 10;
pub const BOX_BOTTOM_OFFSET: u32 = 40;
pub const BOX_WIDTH: u32 = 100;
pub const BOX_HEIGHT: u32 = 30;

/// Black at 50 % opacity
pub const BOX_OPACITY: f64 = 0.5;

/// Text origin: left edge and baseline
pub const TEXT_X: u32 = 20;
pub const TEXT_BASELINE_OFFSET: u32 = 20;

const GLYPH_COLUMNS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
const GLYPH_SCALE: u32 = 2;
const GLYPH_ADVANCE: u32 = 12;

/// 5x7 bitmap rows, bit 4 is the leftmost column
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
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
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => return None,
    };
    Some(rows)
}

/// Darken the label box and draw `label` in white on top of it
pub fn draw_timestamp_overlay(canvas: &mut RgbImage, label: &str) {
    let height = canvas.height();
    if height < BOX_BOTTOM_OFFSET {
        return;
    }

    darken_rect(canvas, BOX_X, height - BOX_BOTTOM_OFFSET, BOX_WIDTH, BOX_HEIGHT, BOX_OPACITY);
    draw_text(canvas, label, TEXT_X, height - TEXT_BASELINE_OFFSET);
}

fn darken_rect(canvas: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, opacity: f64) {
    let x_end = (x + width).min(canvas.width());
    let y_end = (y + height).min(canvas.height());

    for py in y..y_end {
        for px in x..x_end {
            let pixel = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                pixel[c] = (pixel[c] as f64 * (1.0 - opacity)).round() as u8;
            }
        }
    }
}

/// Characters without a glyph leave a blank cell
fn draw_text(canvas: &mut RgbImage, text: &str, x: u32, baseline: u32) {
    let glyph_height = GLYPH_ROWS * GLYPH_SCALE;
    let Some(top) = baseline.checked_sub(glyph_height) else {
        return;
    };

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let origin_x = x + i as u32 * GLYPH_ADVANCE;

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLUMNS {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                fill_block(
                    canvas,
                    origin_x + col * GLYPH_SCALE,
                    top + row as u32 * GLYPH_SCALE,
                    GLYPH_SCALE,
                );
            }
        }
    }
}

fn fill_block(canvas: &mut RgbImage, x: u32, y: u32, size: u32) {
    for py in y..(y + size).min(canvas.height()) {
        for px in x..(x + size).min(canvas.width()) {
            canvas.put_pixel(px, py, image::Rgb([255, 255, 255]));
        }
    }
}
