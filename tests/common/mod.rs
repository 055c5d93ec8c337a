#![allow(dead_code)]

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};

pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
pub const OBJECT: Rgb<u8> = Rgb([200, 60, 60]);

/// A flat background with filled `(x, y, width, height)` objects.
pub fn scene(width: u32, height: u32, objects: &[(u32, u32, u32, u32)]) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    for &(x, y, w, h) in objects {
        for py in y..(y + h).min(height) {
            for px in x..(x + w).min(width) {
                img.put_pixel(px, py, OBJECT);
            }
        }
    }
    img
}

pub fn write_scene(path: &Path, width: u32, height: u32, objects: &[(u32, u32, u32, u32)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    scene(width, height, objects)
        .save(path)
        .expect("write scene image");
}

/// Creates placeholder files; contents do not matter to the verifier.
pub fn touch_all(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).expect("create dir");
    for name in names {
        fs::write(dir.join(name), name.as_bytes()).expect("write placeholder");
    }
}

pub fn line_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .expect("read label file")
        .lines()
        .count()
}
