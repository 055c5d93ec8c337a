//! Normalized detection boxes.

use std::fmt;

use serde::Serialize;

use super::PixelRect;

/// Float noise absorbed before truncating a projected edge to a pixel index.
///
/// `(0.3 - 0.2) * 100.0` is `9.999999999999998`; without the nudge a box
/// built from pixel 10 would project back to pixel 9.
const PIXEL_EPS: f64 = 1e-6;

/// A point in normalized image coordinates (0.0 to 1.0).
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

impl NormPoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The shape carried by a [`BoundingBox`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// Axis-aligned rectangle as normalized center and size.
    Rect {
        x_center: f64,
        y_center: f64,
        width: f64,
        height: f64,
    },
    /// A single keypoint. Has zero width and height.
    Point { x: f64, y: f64 },
    /// An ordered outline of normalized vertices.
    Polygon { points: Vec<NormPoint> },
}

/// An immutable labeled region, normalized to the image it was detected in.
///
/// Merging or re-projecting a box always produces a new value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    label_id: u32,
    geometry: Geometry,
}

impl BoundingBox {
    /// Creates a rectangle box from normalized center and size.
    pub fn new(label_id: u32, x_center: f64, y_center: f64, width: f64, height: f64) -> Self {
        Self {
            label_id,
            geometry: Geometry::Rect {
                x_center,
                y_center,
                width,
                height,
            },
        }
    }

    /// Creates a point box.
    pub fn point(label_id: u32, x: f64, y: f64) -> Self {
        Self {
            label_id,
            geometry: Geometry::Point { x, y },
        }
    }

    /// Creates a polygon box from an ordered list of normalized vertices.
    pub fn polygon(label_id: u32, points: Vec<NormPoint>) -> Self {
        Self {
            label_id,
            geometry: Geometry::Polygon { points },
        }
    }

    #[inline]
    pub fn label_id(&self) -> u32 {
        self.label_id
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Returns the normalized extent as `(left, top, right, bottom)`.
    ///
    /// Points collapse to a zero-sized extent; polygons use the tightest
    /// axis-aligned rectangle around their vertices.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        match &self.geometry {
            Geometry::Rect {
                x_center,
                y_center,
                width,
                height,
            } => (
                x_center - width / 2.0,
                y_center - height / 2.0,
                x_center + width / 2.0,
                y_center + height / 2.0,
            ),
            Geometry::Point { x, y } => (*x, *y, *x, *y),
            Geometry::Polygon { points } => {
                if points.is_empty() {
                    return (0.0, 0.0, 0.0, 0.0);
                }
                points.iter().fold(
                    (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                    |(l, t, r, b), p| (l.min(p.x), t.min(p.y), r.max(p.x), b.max(p.y)),
                )
            }
        }
    }

    pub fn x_center(&self) -> f64 {
        match &self.geometry {
            Geometry::Rect { x_center, .. } => *x_center,
            Geometry::Point { x, .. } => *x,
            Geometry::Polygon { .. } => {
                let (l, _, r, _) = self.extent();
                (l + r) / 2.0
            }
        }
    }

    pub fn y_center(&self) -> f64 {
        match &self.geometry {
            Geometry::Rect { y_center, .. } => *y_center,
            Geometry::Point { y, .. } => *y,
            Geometry::Polygon { .. } => {
                let (_, t, _, b) = self.extent();
                (t + b) / 2.0
            }
        }
    }

    pub fn width(&self) -> f64 {
        match &self.geometry {
            Geometry::Rect { width, .. } => *width,
            Geometry::Point { .. } => 0.0,
            Geometry::Polygon { .. } => {
                let (l, _, r, _) = self.extent();
                r - l
            }
        }
    }

    pub fn height(&self) -> f64 {
        match &self.geometry {
            Geometry::Rect { height, .. } => *height,
            Geometry::Point { .. } => 0.0,
            Geometry::Polygon { .. } => {
                let (_, t, _, b) = self.extent();
                b - t
            }
        }
    }

    /// Returns the normalized area (`width * height`).
    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Computes intersection-over-union of the two axis-aligned extents.
    ///
    /// Returns 0.0 when the extents do not touch or when both are empty.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let (al, at, ar, ab) = self.extent();
        let (bl, bt, br, bb) = other.extent();

        let left = al.max(bl);
        let top = at.max(bt);
        let right = ar.min(br);
        let bottom = ab.min(bb);

        if right < left || bottom < top {
            return 0.0;
        }

        let intersection = (right - left) * (bottom - top);
        let union = (ar - al) * (ab - at) + (br - bl) * (bb - bt) - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        (intersection / union).min(1.0)
    }

    /// Projects the box onto an image of the given size.
    ///
    /// Edges are truncated toward zero to whole pixels, after snapping
    /// values within `PIXEL_EPS` below an integer onto it.
    pub fn absolute_coords(&self, image_width: u32, image_height: u32) -> PixelRect {
        let (l, t, r, b) = self.extent();
        let (w, h) = (f64::from(image_width), f64::from(image_height));
        PixelRect::new(
            to_pixel(l * w),
            to_pixel(t * h),
            to_pixel(r * w),
            to_pixel(b * h),
        )
    }

    /// Formats the box as one detection label line (without newline).
    ///
    /// Rectangles are `label cx cy w h`, points `label x y`, polygons
    /// `label x1 y1 ... xn yn`, every number with six decimals.
    pub fn to_detection_string(&self) -> String {
        match &self.geometry {
            Geometry::Rect {
                x_center,
                y_center,
                width,
                height,
            } => format!(
                "{} {:.6} {:.6} {:.6} {:.6}",
                self.label_id, x_center, y_center, width, height
            ),
            Geometry::Point { x, y } => format!("{} {:.6} {:.6}", self.label_id, x, y),
            Geometry::Polygon { points } => {
                let mut line = self.label_id.to_string();
                for p in points {
                    line.push_str(&format!(" {:.6} {:.6}", p.x, p.y));
                }
                line
            }
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_detection_string())
    }
}

/// Truncation toward zero that tolerates float error from normalization.
fn to_pixel(value: f64) -> i64 {
    if value >= 0.0 {
        (value + PIXEL_EPS).trunc() as i64
    } else {
        (value - PIXEL_EPS).trunc() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_is_one() {
        let bbox = BoundingBox::new(0, 0.4, 0.6, 0.2, 0.3);
        assert_eq!(bbox.iou(&bbox), 1.0);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BoundingBox::new(0, 0.1, 0.1, 0.05, 0.05);
        let b = BoundingBox::new(0, 0.9, 0.9, 0.05, 0.05);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(b.iou(&a), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // [0.0, 0.5] vs [0.25, 0.75] on x, identical on y: 0.25 / 0.75
        let a = BoundingBox::new(0, 0.25, 0.5, 0.5, 1.0);
        let b = BoundingBox::new(0, 0.5, 0.5, 0.5, 1.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_iou_points_are_zero() {
        let p = BoundingBox::point(1, 0.5, 0.5);
        assert_eq!(p.iou(&p), 0.0);
    }

    #[test]
    fn test_absolute_coords_truncate() {
        let bbox = PixelRect::new(10, 10, 50, 50).to_bbox(0, 100, 100);
        assert_eq!(bbox.absolute_coords(100, 100), PixelRect::new(10, 10, 50, 50));

        let bbox = BoundingBox::new(0, 0.5, 0.5, 0.333, 0.333);
        // 0.3335 * 10 = 3.335 -> 3, 0.6665 * 10 = 6.665 -> 6
        assert_eq!(bbox.absolute_coords(10, 10), PixelRect::new(3, 3, 6, 6));
    }

    #[test]
    fn test_to_pixel_snaps_only_within_eps() {
        assert_eq!(to_pixel(19.999_999_999_999_996), 20);
        assert_eq!(to_pixel(2.999_999_9), 3);
        assert_eq!(to_pixel(2.999_99), 2);
        assert_eq!(to_pixel(7.5), 7);
        assert_eq!(to_pixel(-1.5), -1);
        assert_eq!(to_pixel(-2.999_999_9), -3);
    }

    #[test]
    fn test_detection_string_rect() {
        let bbox = BoundingBox::new(2, 0.5, 0.25, 0.125, 1.0);
        assert_eq!(
            bbox.to_detection_string(),
            "2 0.500000 0.250000 0.125000 1.000000"
        );
        assert_eq!(bbox.to_string(), bbox.to_detection_string());
    }

    #[test]
    fn test_detection_string_point_and_polygon() {
        assert_eq!(
            BoundingBox::point(1, 0.1, 0.2).to_detection_string(),
            "1 0.100000 0.200000"
        );

        let polygon = BoundingBox::polygon(
            4,
            vec![
                NormPoint::new(0.1, 0.1),
                NormPoint::new(0.5, 0.1),
                NormPoint::new(0.3, 0.4),
            ],
        );
        assert_eq!(
            polygon.to_detection_string(),
            "4 0.100000 0.100000 0.500000 0.100000 0.300000 0.400000"
        );
    }

    #[test]
    fn test_polygon_extent() {
        let polygon = BoundingBox::polygon(
            0,
            vec![NormPoint::new(0.2, 0.1), NormPoint::new(0.6, 0.5)],
        );
        assert_eq!(polygon.extent(), (0.2, 0.1, 0.6, 0.5));
        assert!((polygon.width() - 0.4).abs() < 1e-12);
        assert!((polygon.x_center() - 0.4).abs() < 1e-12);
    }
}
