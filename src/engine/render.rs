//! Preview output for a single compared pair.

use std::fs;
use std::path::Path;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::error::DiffLabelError;
use crate::geom::BoundingBox;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Draws every box onto a copy of `image` as a 2px green outline.
pub fn draw_boxes(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();
    for bbox in boxes {
        let rect = bbox.absolute_coords(width, height);
        for inset in 0..2 {
            let w = rect.width() - 2 * inset;
            let h = rect.height() - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let outline = Rect::at((rect.x1 + inset) as i32, (rect.y1 + inset) as i32)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, outline, BOX_COLOR);
        }
    }
    canvas
}

/// Saves the binary difference mask. The format follows the extension.
pub fn save_mask(mask: &GrayImage, path: &Path) -> Result<(), DiffLabelError> {
    ensure_parent(path)?;
    mask.save(path).map_err(|source| DiffLabelError::ImageEncode {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves `image` with `boxes` drawn on top.
pub fn save_preview(
    image: &RgbImage,
    boxes: &[BoundingBox],
    path: &Path,
) -> Result<(), DiffLabelError> {
    ensure_parent(path)?;
    draw_boxes(image, boxes)
        .save(path)
        .map_err(|source| DiffLabelError::ImageEncode {
            path: path.to_path_buf(),
            source,
        })
}

fn ensure_parent(path: &Path) -> Result<(), DiffLabelError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|source| DiffLabelError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })
        }
        None => Ok(()),
    }
}
