#![allow(dead_code)]

use difflabel::geom::{BoundingBox, PixelRect};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const IMAGE_SIZE: u32 = 640;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(128);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Non-empty pixel rectangles inside an `IMAGE_SIZE` square.
pub fn arb_rect() -> impl Strategy<Value = PixelRect> {
    let size = i64::from(IMAGE_SIZE);
    (0..size - 1, 0..size - 1).prop_flat_map(move |(x1, y1)| {
        (x1 + 1..=size, y1 + 1..=size).prop_map(move |(x2, y2)| PixelRect::new(x1, y1, x2, y2))
    })
}

/// Normalized boxes with positive area, built from pixel rectangles.
pub fn arb_box() -> impl Strategy<Value = BoundingBox> {
    (arb_rect(), 0u32..5).prop_map(|(rect, label)| rect.to_bbox(label, IMAGE_SIZE, IMAGE_SIZE))
}
