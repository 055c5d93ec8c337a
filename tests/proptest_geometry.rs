use difflabel::engine::merge_overlapping;
use difflabel::geom::PixelRect;
use proptest::prelude::*;

mod proptest_helpers;

use proptest_helpers::{arb_box, arb_rect, IMAGE_SIZE};

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn iou_is_symmetric_and_bounded(a in arb_box(), b in arb_box()) {
        let ab = a.iou(&b);
        let ba = b.iou(&a);
        prop_assert!((ab - ba).abs() < 1e-12, "{ab} != {ba}");
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn iou_with_itself_is_one(a in arb_box()) {
        prop_assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_rects_survive_normalization(rect in arb_rect()) {
        let bbox = rect.to_bbox(0, IMAGE_SIZE, IMAGE_SIZE);
        prop_assert_eq!(bbox.absolute_coords(IMAGE_SIZE, IMAGE_SIZE), rect);
    }

    #[test]
    fn merged_boxes_cover_their_inputs(
        boxes in prop::collection::vec(arb_box(), 1..8),
        min_iou in 0.0f64..0.9,
    ) {
        let merged = merge_overlapping(boxes.clone(), min_iou, IMAGE_SIZE, IMAGE_SIZE);
        prop_assert!(merged.len() <= boxes.len());
        prop_assert!(!merged.is_empty());

        for input in &boxes {
            let r = input.absolute_coords(IMAGE_SIZE, IMAGE_SIZE);
            let covered = merged.iter().any(|m| {
                let c = m.absolute_coords(IMAGE_SIZE, IMAGE_SIZE);
                c.x1 <= r.x1 && c.y1 <= r.y1 && c.x2 >= r.x2 && c.y2 >= r.y2
            });
            prop_assert!(covered, "{:?} not covered by {:?}", r, merged);
        }
    }

    #[test]
    fn merging_one_box_is_identity(a in arb_box(), min_iou in 0.0f64..1.0) {
        let merged = merge_overlapping(vec![a.clone()], min_iou, IMAGE_SIZE, IMAGE_SIZE);
        prop_assert_eq!(merged, vec![a]);
    }
}

#[test]
fn disjoint_boxes_have_zero_iou() {
    let a = difflabel::geom::BoundingBox::new(0, 0.1, 0.1, 0.05, 0.05);
    let b = difflabel::geom::BoundingBox::new(0, 0.9, 0.9, 0.05, 0.05);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(b.iou(&a), 0.0);
}

#[test]
fn merge_containment_example() {
    let boxes = vec![
        PixelRect::new(10, 10, 50, 50).to_bbox(0, 100, 100),
        PixelRect::new(40, 40, 80, 80).to_bbox(0, 100, 100),
    ];
    let merged = merge_overlapping(boxes, 0.01, 100, 100);
    assert_eq!(merged.len(), 1);
    assert_eq!(
        merged[0].absolute_coords(100, 100),
        PixelRect::new(10, 10, 80, 80)
    );
}
