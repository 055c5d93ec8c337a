//! Greedy IoU-based merging of overlapping boxes.

use std::cmp::Ordering;

use crate::geom::BoundingBox;

/// Merges boxes whose IoU with a larger box exceeds `min_iou`.
///
/// Boxes are visited largest first (stable for equal areas). Each unvisited
/// box claims every later unvisited box overlapping it above the threshold;
/// a group of one passes through untouched, a larger group becomes the
/// smallest pixel rectangle covering all members, labeled like its largest
/// member.
pub fn merge_overlapping(
    mut boxes: Vec<BoundingBox>,
    min_iou: f64,
    image_width: u32,
    image_height: u32,
) -> Vec<BoundingBox> {
    if boxes.len() < 2 {
        return boxes;
    }

    boxes.sort_by(|a, b| b.area().partial_cmp(&a.area()).unwrap_or(Ordering::Equal));

    let mut grouped = vec![false; boxes.len()];
    let mut result = Vec::with_capacity(boxes.len());

    for i in 0..boxes.len() {
        if grouped[i] {
            continue;
        }
        grouped[i] = true;

        let mut members = vec![i];
        for j in (i + 1)..boxes.len() {
            if !grouped[j] && boxes[i].iou(&boxes[j]) > min_iou {
                grouped[j] = true;
                members.push(j);
            }
        }

        if members.len() == 1 {
            result.push(boxes[i].clone());
        } else {
            let cover = members
                .iter()
                .map(|&m| boxes[m].absolute_coords(image_width, image_height))
                .reduce(|acc, r| acc.union(&r))
                .unwrap_or_default();
            log::debug!("merged {} boxes into {:?}", members.len(), cover);
            result.push(cover.to_bbox(boxes[i].label_id(), image_width, image_height));
        }
    }

    result
}
