//! Geometric value types shared by the diff engine and the batch writer.
//!
//! Boxes are stored the way detection label files store them: normalized
//! center/size relative to the image, so a box stays meaningful when the
//! image is rescaled. Pixel-space work (padding, clamping, merging) happens
//! on [`PixelRect`] and is converted back with [`PixelRect::to_bbox`].
//!
//! # Example
//!
//! ```
//! use difflabel::geom::{BoundingBox, PixelRect};
//!
//! let bbox = PixelRect::new(10, 10, 50, 50).to_bbox(0, 100, 100);
//! assert_eq!(bbox.to_detection_string(), "0 0.300000 0.300000 0.400000 0.400000");
//! assert_eq!(bbox.absolute_coords(100, 100), PixelRect::new(10, 10, 50, 50));
//! ```

mod bbox;
mod rect;

pub use bbox::{BoundingBox, Geometry, NormPoint};
pub use rect::PixelRect;
