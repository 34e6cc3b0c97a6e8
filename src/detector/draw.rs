//! Bounding box rendering for annotated evidence images

use super::RawDetection;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const BOX_THICKNESS: i32 = 2;

// Small rotating palette so adjacent SKU classes stay distinguishable
const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [72, 249, 10],
    [26, 147, 52],
    [61, 219, 134],
];

fn class_color(class_id: i64) -> Rgb<u8> {
    let idx = (class_id.rem_euclid(PALETTE.len() as i64)) as usize;
    Rgb(PALETTE[idx])
}

/// Draw detection boxes onto an RGB image in place.
///
/// Boxes are clamped to the image bounds; degenerate boxes are skipped.
pub fn draw_detections(image: &mut RgbImage, detections: &[RawDetection]) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    for det in detections {
        let [x1, y1, x2, y2] = det.bbox;

        let x1 = x1.clamp(0.0, w - 1.0).floor() as i32;
        let y1 = y1.clamp(0.0, h - 1.0).floor() as i32;
        let x2 = x2.clamp(0.0, w - 1.0).ceil() as i32;
        let y2 = y2.clamp(0.0, h - 1.0).ceil() as i32;

        if x1 >= x2 || y1 >= y2 {
            continue;
        }

        let color = class_color(det.class_id);

        for t in 0..BOX_THICKNESS {
            let (bx, by) = (x1 + t, y1 + t);
            let bw = (x2 - x1 - 2 * t).max(1) as u32;
            let bh = (y2 - y1 - 2 * t).max(1) as u32;
            draw_hollow_rect_mut(image, Rect::at(bx, by).of_size(bw, bh), color);
        }
    }
}
