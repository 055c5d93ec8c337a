//! Background-difference box detection.
//!
//! Given a background image and a sample showing the same scene with new
//! objects, the engine marks pixels that changed, cleans the mask with a
//! 5x5 close/open, traces external contours and turns each large enough
//! contour into a normalized [`BoundingBox`].
//!
//! The engine never fails loudly: an undecodable image yields
//! [`DiffResult::failed`] and a message on the injected log sink.

mod mask;
mod merge;
pub mod render;

pub use mask::{clean_mask, difference_mask, external_regions, Region};
pub use merge::merge_overlapping;

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::Serialize;

use crate::config::DiffConfig;
use crate::error::DiffLabelError;
use crate::geom::BoundingBox;
use crate::hooks::{default_sink, SharedSink};

/// Detection parameters, a snapshot of the relevant [`DiffConfig`] fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffOptions {
    pub diff_threshold: u8,
    pub min_diff_area: u32,
    pub bbox_padding: u32,
    pub min_merge_iou: f64,
    pub default_label: u32,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self::from(&DiffConfig::default())
    }
}

impl From<&DiffConfig> for DiffOptions {
    fn from(config: &DiffConfig) -> Self {
        Self {
            diff_threshold: config.diff_threshold,
            min_diff_area: config.min_diff_area,
            bbox_padding: config.bbox_padding,
            min_merge_iou: config.min_merge_iou,
            default_label: config.default_label,
        }
    }
}

/// The cleaned difference mask and the boxes found in it.
///
/// A result without mask means the pair could not be processed.
#[derive(Clone, Debug, Default)]
pub struct DiffResult {
    pub mask: Option<GrayImage>,
    pub boxes: Vec<BoundingBox>,
}

impl DiffResult {
    /// The sentinel for a pair that could not be processed.
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn is_failure(&self) -> bool {
        self.mask.is_none()
    }
}

/// Stateless difference detector. Cheap to share across threads.
#[derive(Clone)]
pub struct DiffEngine {
    options: DiffOptions,
    sink: SharedSink,
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DiffEngine {
    /// Creates an engine logging through the `log` facade.
    pub fn new(options: DiffOptions) -> Self {
        Self::with_sink(options, default_sink())
    }

    pub fn with_sink(options: DiffOptions, sink: SharedSink) -> Self {
        Self { options, sink }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Decodes an image file as 8-bit RGB.
    pub fn load_image(path: &Path) -> Result<RgbImage, DiffLabelError> {
        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|source| DiffLabelError::ImageDecode {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Decodes both files and compares them.
    pub fn compute_paths(&self, background: &Path, sample: &Path) -> DiffResult {
        let background = match Self::load_image(background) {
            Ok(img) => img,
            Err(e) => {
                self.sink.log(&format!("image read failed: {e}"));
                return DiffResult::failed();
            }
        };
        self.compute_with_background(&background, sample)
    }

    /// Compares a sample file against an already decoded background.
    pub fn compute_with_background(&self, background: &RgbImage, sample: &Path) -> DiffResult {
        match Self::load_image(sample) {
            Ok(sample) => self.compute(background, &sample),
            Err(e) => {
                self.sink.log(&format!("image read failed: {e}"));
                DiffResult::failed()
            }
        }
    }

    /// Compares two decoded images.
    ///
    /// A sample of a different size is first resized (nearest neighbor) to
    /// the background's size.
    pub fn compute(&self, background: &RgbImage, sample: &RgbImage) -> DiffResult {
        let Some(sample) = reconcile(background, sample) else {
            self.sink.log(&format!(
                "cannot compare a {:?} background with a {:?} sample",
                background.dimensions(),
                sample.dimensions()
            ));
            return DiffResult::failed();
        };

        let (width, height) = background.dimensions();
        let raw = difference_mask(background, &sample, self.options.diff_threshold);
        let mask = clean_mask(&raw);

        let mut boxes: Vec<BoundingBox> = external_regions(&mask)
            .into_iter()
            .filter(|region| region.area >= f64::from(self.options.min_diff_area))
            .map(|region| {
                region
                    .rect
                    .padded(self.options.bbox_padding, width, height)
                    .to_bbox(self.options.default_label, width, height)
            })
            .collect();

        if self.options.min_merge_iou > 0.0 && boxes.len() > 1 {
            boxes = merge_overlapping(boxes, self.options.min_merge_iou, width, height);
        }

        log::debug!("diff found {} box(es) in {}x{}", boxes.len(), width, height);
        DiffResult {
            mask: Some(mask),
            boxes,
        }
    }
}

/// Returns the sample at the background's size, or `None` if either image
/// is empty.
fn reconcile<'a>(
    background: &RgbImage,
    sample: &'a RgbImage,
) -> Option<std::borrow::Cow<'a, RgbImage>> {
    let (bw, bh) = background.dimensions();
    let (sw, sh) = sample.dimensions();
    if bw == 0 || bh == 0 || sw == 0 || sh == 0 {
        return None;
    }
    if (bw, bh) == (sw, sh) {
        Some(std::borrow::Cow::Borrowed(sample))
    } else {
        log::debug!("resizing sample {sw}x{sh} to {bw}x{bh}");
        Some(std::borrow::Cow::Owned(imageops::resize(
            sample,
            bw,
            bh,
            FilterType::Nearest,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PixelRect;
    use crate::hooks::MemorySink;
    use image::Rgb;
    use std::sync::Arc;

    fn scene(width: u32, height: u32, squares: &[PixelRect]) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([20, 20, 20]));
        for rect in squares {
            for y in rect.y1..rect.y2 {
                for x in rect.x1..rect.x2 {
                    img.put_pixel(x as u32, y as u32, Rgb([220, 40, 40]));
                }
            }
        }
        img
    }

    fn options() -> DiffOptions {
        DiffOptions {
            diff_threshold: 30,
            min_diff_area: 100,
            bbox_padding: 0,
            min_merge_iou: 0.0,
            default_label: 2,
        }
    }

    #[test]
    fn test_identical_images_have_no_boxes() {
        let bg = scene(64, 64, &[]);
        let result = DiffEngine::new(options()).compute(&bg, &bg);
        assert!(!result.is_failure());
        assert!(result.boxes.is_empty());
    }

    #[test]
    fn test_single_object_box() {
        let bg = scene(100, 100, &[]);
        let sample = scene(100, 100, &[PixelRect::new(20, 30, 60, 50)]);
        let result = DiffEngine::new(options()).compute(&bg, &sample);

        assert_eq!(result.boxes.len(), 1);
        let bbox = &result.boxes[0];
        assert_eq!(bbox.label_id(), 2);
        assert_eq!(bbox.absolute_coords(100, 100), PixelRect::new(20, 30, 60, 50));
        assert_eq!(bbox.to_detection_string(), "2 0.400000 0.400000 0.400000 0.200000");
    }

    #[test]
    fn test_object_in_corner_is_boxed() {
        let bg = scene(64, 64, &[]);
        let sample = scene(64, 64, &[PixelRect::new(0, 0, 20, 20)]);
        let result = DiffEngine::new(options()).compute(&bg, &sample);

        assert_eq!(result.boxes.len(), 1);
        assert_eq!(result.boxes[0].absolute_coords(64, 64), PixelRect::new(0, 0, 20, 20));
    }

    #[test]
    fn test_full_frame_change_is_one_box() {
        let bg = scene(64, 64, &[]);
        let sample = scene(64, 64, &[PixelRect::new(0, 0, 64, 64)]);
        let result = DiffEngine::new(options()).compute(&bg, &sample);

        assert_eq!(result.boxes.len(), 1);
        assert_eq!(result.boxes[0].absolute_coords(64, 64), PixelRect::new(0, 0, 64, 64));
        assert_eq!(
            result.boxes[0].to_detection_string(),
            "2 0.500000 0.500000 1.000000 1.000000"
        );
    }

    #[test]
    fn test_min_area_filters_small_regions() {
        let bg = scene(100, 100, &[]);
        let sample = scene(
            100,
            100,
            &[PixelRect::new(5, 5, 13, 13), PixelRect::new(50, 50, 80, 80)],
        );
        let result = DiffEngine::new(options()).compute(&bg, &sample);
        // 8x8 block traces to 7x7 = 49 < 100
        assert_eq!(result.boxes.len(), 1);
        assert_eq!(
            result.boxes[0].absolute_coords(100, 100),
            PixelRect::new(50, 50, 80, 80)
        );
    }

    #[test]
    fn test_padding_expands_box() {
        let bg = scene(100, 100, &[]);
        let sample = scene(100, 100, &[PixelRect::new(20, 20, 40, 40)]);
        let engine = DiffEngine::new(DiffOptions {
            bbox_padding: 5,
            ..options()
        });
        let result = engine.compute(&bg, &sample);
        assert_eq!(
            result.boxes[0].absolute_coords(100, 100),
            PixelRect::new(15, 15, 45, 45)
        );
    }

    #[test]
    fn test_merge_joins_padded_overlaps() {
        let bg = scene(100, 100, &[]);
        let sample = scene(
            100,
            100,
            &[PixelRect::new(10, 10, 40, 40), PixelRect::new(50, 10, 80, 40)],
        );
        let separate = DiffEngine::new(DiffOptions {
            bbox_padding: 8,
            ..options()
        })
        .compute(&bg, &sample);
        assert_eq!(separate.boxes.len(), 2);

        let merged = DiffEngine::new(DiffOptions {
            bbox_padding: 8,
            min_merge_iou: 0.05,
            ..options()
        })
        .compute(&bg, &sample);
        assert_eq!(merged.boxes.len(), 1);
        assert_eq!(
            merged.boxes[0].absolute_coords(100, 100),
            PixelRect::new(2, 2, 88, 48)
        );
    }

    #[test]
    fn test_sample_is_resized_to_background() {
        let bg = scene(100, 100, &[]);
        let sample = scene(50, 50, &[PixelRect::new(10, 10, 30, 30)]);
        let result = DiffEngine::new(options()).compute(&bg, &sample);
        let mask = result.mask.expect("mask");
        assert_eq!(mask.dimensions(), (100, 100));
        assert_eq!(result.boxes.len(), 1);
        let rect = result.boxes[0].absolute_coords(100, 100);
        for (got, want) in [(rect.x1, 20), (rect.y1, 20), (rect.x2, 60), (rect.y2, 60)] {
            assert!((got - want).abs() <= 1, "{rect:?}");
        }
    }

    #[test]
    fn test_empty_image_is_failure() {
        let sink = Arc::new(MemorySink::new());
        let engine = DiffEngine::with_sink(options(), sink.clone());
        let result = engine.compute(&RgbImage::new(0, 0), &scene(10, 10, &[]));
        assert!(result.is_failure());
        assert!(result.boxes.is_empty());
        assert!(sink.contains("cannot compare"));
    }

    #[test]
    fn test_undecodable_file_is_failure() {
        let temp = tempfile::tempdir().unwrap();
        let bad = temp.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();

        let sink = Arc::new(MemorySink::new());
        let engine = DiffEngine::with_sink(options(), sink.clone());
        let result = engine.compute_paths(&bad, &bad);
        assert!(result.is_failure());
        assert!(sink.contains("image read failed"));
    }
}
