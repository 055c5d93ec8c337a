//! Difference masks and region extraction.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::point::Point;

use crate::geom::PixelRect;

pub const FOREGROUND: u8 = 255;

/// Chebyshev radius 2, i.e. a 5x5 square structuring element.
const MORPH_RADIUS: u8 = 2;

/// A connected changed region found in a cleaned mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    /// Tight pixel bounds, exclusive max edges.
    pub rect: PixelRect,
    /// Area enclosed by the traced outer border (shoelace formula over the
    /// border pixel centers, so a filled 10x10 block measures 81).
    pub area: f64,
}

/// Marks every pixel where any channel differs by more than `threshold`.
///
/// Thresholding each channel separately and OR-ing the results catches
/// color shifts that a grayscale difference averages away. The comparison
/// is exclusive: a difference equal to `threshold` stays background.
pub fn difference_mask(background: &RgbImage, sample: &RgbImage, threshold: u8) -> GrayImage {
    debug_assert_eq!(background.dimensions(), sample.dimensions());
    let (width, height) = background.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let a = background.get_pixel(x, y).0;
        let b = sample.get_pixel(x, y).0;
        let changed = a.iter().zip(b.iter()).any(|(p, q)| p.abs_diff(*q) > threshold);
        Luma([if changed { FOREGROUND } else { 0 }])
    })
}

/// Bridges small gaps (close) and then removes speckles (open).
pub fn clean_mask(mask: &GrayImage) -> GrayImage {
    let closed = close(mask, Norm::LInf, MORPH_RADIUS);
    open(&closed, Norm::LInf, MORPH_RADIUS)
}

/// Returns one region per external contour of the mask, in trace order.
///
/// The mask is traced inside a 1 px background frame so that regions
/// touching the image edge still get an outer border.
pub fn external_regions(mask: &GrayImage) -> Vec<Region> {
    find_contours::<i64>(&framed(mask))
        .into_iter()
        .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
        .filter_map(|c| region_of(&c))
        .collect()
}

/// Copies `mask` into the center of a canvas one pixel larger on every side.
fn framed(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut canvas = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut canvas, mask, 1, 1);
    canvas
}

/// Bounds and area of a contour traced in a framed mask.
fn region_of(contour: &Contour<i64>) -> Option<Region> {
    let first = contour.points.first()?;
    let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        x1 = x1.min(p.x);
        y1 = y1.min(p.y);
        x2 = x2.max(p.x);
        y2 = y2.max(p.y);
    }
    // frame offset: -1 on the min edges, +1 (exclusive) - 1 on the max edges
    Some(Region {
        rect: PixelRect::new(x1 - 1, y1 - 1, x2, y2),
        area: polygon_area(&contour.points),
    })
}

fn polygon_area(points: &[Point<i64>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    twice.abs() as f64 / 2.0
}
