#![cfg(feature = "annotate")]

//! Box drawing for annotated benchmark output images.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::Detection;

/// Small fixed palette cycled by class id.
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([230, 57, 70]),
    Rgb([46, 196, 182]),
    Rgb([255, 183, 3]),
    Rgb([66, 135, 245]),
    Rgb([144, 190, 109]),
    Rgb([181, 101, 222]),
];

/// Draw every detection as a hollow rectangle in original-image pixels.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        let bbox = detection.bbox;
        let width = (bbox.x_max - bbox.x_min).max(1) as u32;
        let height = (bbox.y_max - bbox.y_min).max(1) as u32;
        let rect = Rect::at(bbox.x_min as i32, bbox.y_min as i32).of_size(width, height);
        let color = PALETTE[detection.class_id % PALETTE.len()];
        draw_hollow_rect_mut(image, rect, color);
    }
}
