//! Confusion-matrix heatmap rendered straight into a PNG.

use image::{Rgb, RgbImage};
use medbench_core::{ConfusionMatrix, Result};
use std::path::Path;

const CELL: u32 = 40;
const MARGIN_LEFT: u32 = 44;
const MARGIN_TOP: u32 = 40;
const MARGIN_BOTTOM: u32 = 40;
const SCALE_GAP: u32 = 16;
const SCALE_WIDTH: u32 = 18;
const MARGIN_RIGHT: u32 = 48;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const TITLE_BAR: Rgb<u8> = Rgb([33, 37, 41]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);
const GRID: Rgb<u8> = Rgb([200, 200, 200]);

/// 3×5 glyphs, one row per byte, leftmost pixel in bit 2
fn glyph(c: char) -> [u8; 5] {
    match c {
        '0' | 'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' | 'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        _ => [0; 5],
    }
}

fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        n * 4 * scale - scale
    }
}

/// Draws `text` with its top-left corner at `(x, y)`; off-canvas pixels are clipped
fn draw_text(img: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
    for (i, c) in text.chars().enumerate() {
        let origin = x + i as u32 * 4 * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                fill_rect(
                    img,
                    origin + col * scale,
                    y + row as u32 * scale,
                    scale,
                    scale,
                    color,
                );
            }
        }
    }
}

fn draw_text_centered(img: &mut RgbImage, text: &str, cx: u32, cy: u32, scale: u32, color: Rgb<u8>) {
    let x = cx.saturating_sub(text_width(text, scale) / 2);
    let y = cy.saturating_sub(5 * scale / 2);
    draw_text(img, text, x, y, scale, color);
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

/// White-to-blue ramp for `t` in `[0, 1]`
fn heat_color(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgb([lerp(247, 8), lerp(251, 48), lerp(255, 107)])
}

/// Renders the matrix with rows as true classes and columns as predictions
pub fn render_confusion_matrix(matrix: &ConfusionMatrix) -> RgbImage {
    let n = matrix.num_classes() as u32;
    let grid = n * CELL;
    let width = MARGIN_LEFT + grid.max(CELL) + SCALE_GAP + SCALE_WIDTH + MARGIN_RIGHT;
    let height = MARGIN_TOP + grid.max(CELL) + MARGIN_BOTTOM;
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    fill_rect(&mut img, 0, 0, width, 24, TITLE_BAR);
    draw_text_centered(&mut img, "CONFUSION MATRIX", width / 2, 12, 2, BACKGROUND);

    let max = matrix.max_count().max(1) as f64;
    for row in 0..n {
        for col in 0..n {
            let count = matrix.get(row as usize, col as usize);
            let t = count as f64 / max;
            let x = MARGIN_LEFT + col * CELL;
            let y = MARGIN_TOP + row * CELL;
            fill_rect(&mut img, x, y, CELL, CELL, heat_color(t));

            let label = count.to_string();
            if text_width(&label, 2) + 4 <= CELL {
                let ink = if t > 0.5 { BACKGROUND } else { INK };
                draw_text_centered(&mut img, &label, x + CELL / 2, y + CELL / 2, 2, ink);
            }
        }
    }

    // cell borders
    for i in 0..=n {
        fill_rect(&mut img, MARGIN_LEFT + i * CELL, MARGIN_TOP, 1, grid + 1, GRID);
        fill_rect(&mut img, MARGIN_LEFT, MARGIN_TOP + i * CELL, grid + 1, 1, GRID);
    }

    for i in 0..n {
        let label = i.to_string();
        let center = i * CELL + CELL / 2;
        draw_text_centered(&mut img, &label, MARGIN_LEFT / 2, MARGIN_TOP + center, 2, INK);
        draw_text_centered(&mut img, &label, MARGIN_LEFT + center, MARGIN_TOP + grid + 10, 2, INK);
    }
    draw_text_centered(&mut img, "PRED", MARGIN_LEFT + grid / 2, MARGIN_TOP + grid + 28, 2, INK);
    draw_text(&mut img, "TRUE", 4, MARGIN_TOP - 12, 2, INK);

    // colour scale, maximum at the top
    let scale_x = MARGIN_LEFT + grid.max(CELL) + SCALE_GAP;
    let scale_h = grid.max(CELL);
    for dy in 0..scale_h {
        let t = 1.0 - dy as f64 / (scale_h.max(2) - 1) as f64;
        fill_rect(&mut img, scale_x, MARGIN_TOP + dy, SCALE_WIDTH, 1, heat_color(t));
    }
    let label_x = scale_x + SCALE_WIDTH + 4;
    draw_text(&mut img, &matrix.max_count().to_string(), label_x, MARGIN_TOP, 1, INK);
    draw_text(&mut img, "0", label_x, MARGIN_TOP + scale_h - 5, 1, INK);

    img
}

/// Writes the heatmap as a PNG
pub fn save_confusion_matrix(matrix: &ConfusionMatrix, path: &Path) -> Result<()> {
    render_confusion_matrix(matrix).save(path)?;
    Ok(())
}
