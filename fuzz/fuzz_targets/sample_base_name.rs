//! Fuzz target for sample filename grouping.
//!
//! Feeds arbitrary filenames to base-name extraction, sequence grouping
//! and background matching, checking for panics.

#![no_main]

use std::path::PathBuf;

use difflabel::batch::{extract_base_name, find_matching_background, group_sequences};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let names: Vec<PathBuf> = text.lines().map(PathBuf::from).collect();
    for name in text.lines() {
        let _ = extract_base_name(name);
        let _ = find_matching_background(name, &names);
    }

    let groups = group_sequences(&names);
    let grouped: usize = groups.values().map(Vec::len).sum();
    assert!(grouped <= names.len());
});
