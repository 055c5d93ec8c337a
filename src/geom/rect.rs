//! Integer rectangles in absolute pixel coordinates.

use serde::Serialize;

use super::BoundingBox;

/// An axis-aligned rectangle in pixel space, XYXY with exclusive max edges.
///
/// Ordering (`x1 <= x2`, `y1 <= y2`) is not enforced here. Rectangles
/// built from contours are always ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PixelRect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl PixelRect {
    /// Creates a rectangle from its corner coordinates.
    #[inline]
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a rectangle from a top-left corner and a size.
    #[inline]
    pub fn from_xywh(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Returns the smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        PixelRect::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Grows the rectangle by `padding` pixels on every side, clamped to an
    /// image of `image_width` x `image_height`.
    ///
    /// The origin is clamped first and the padded size is then capped by the
    /// room left to the right/bottom edge.
    pub fn padded(&self, padding: u32, image_width: u32, image_height: u32) -> PixelRect {
        if padding == 0 {
            return *self;
        }
        let pad = i64::from(padding);
        let x = (self.x1 - pad).max(0);
        let y = (self.y1 - pad).max(0);
        let width = (i64::from(image_width) - x).min(self.width() + 2 * pad);
        let height = (i64::from(image_height) - y).min(self.height() + 2 * pad);
        PixelRect::from_xywh(x, y, width, height)
    }

    /// Normalizes the rectangle against the image size into a detection box.
    pub fn to_bbox(&self, label_id: u32, image_width: u32, image_height: u32) -> BoundingBox {
        let (w, h) = (f64::from(image_width), f64::from(image_height));
        let width = self.width() as f64;
        let height = self.height() as f64;
        BoundingBox::new(
            label_id,
            (self.x1 as f64 + width / 2.0) / w,
            (self.y1 as f64 + height / 2.0) / h,
            width / w,
            height / h,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_dimensions() {
        let rect = PixelRect::from_xywh(10, 20, 30, 40);
        assert_eq!(rect, PixelRect::new(10, 20, 40, 60));
        assert_eq!(rect.width(), 30);
        assert_eq!(rect.height(), 40);
        assert_eq!(rect.area(), 1200);
    }

    #[test]
    fn test_rect_union() {
        let a = PixelRect::new(10, 10, 50, 50);
        let b = PixelRect::new(40, 40, 80, 80);
        assert_eq!(a.union(&b), PixelRect::new(10, 10, 80, 80));
        assert_eq!(b.union(&a), PixelRect::new(10, 10, 80, 80));
    }

    #[test]
    fn test_padding_clamps_to_image() {
        let rect = PixelRect::from_xywh(2, 3, 10, 10);
        let padded = rect.padded(5, 20, 16);
        assert_eq!(padded.x1, 0);
        assert_eq!(padded.y1, 0);
        assert_eq!(padded.width(), 20);
        assert_eq!(padded.height(), 16);
    }

    #[test]
    fn test_padding_inside_image() {
        let rect = PixelRect::from_xywh(20, 20, 10, 10);
        assert_eq!(rect.padded(3, 100, 100), PixelRect::from_xywh(17, 17, 16, 16));
        assert_eq!(rect.padded(0, 100, 100), rect);
    }

    #[test]
    fn test_to_bbox_normalizes() {
        let bbox = PixelRect::new(0, 0, 50, 25).to_bbox(3, 100, 100);
        assert_eq!(bbox.label_id(), 3);
        assert!((bbox.x_center() - 0.25).abs() < 1e-12);
        assert!((bbox.y_center() - 0.125).abs() < 1e-12);
        assert!((bbox.width() - 0.5).abs() < 1e-12);
        assert!((bbox.height() - 0.25).abs() < 1e-12);
    }
}
