//! Fuzz target for custom naming patterns.
//!
//! The first line of the input is compiled as a custom pattern, every
//! following line is classified against it. Checks for panics and hangs
//! in pattern compilation and classification.

#![no_main]

use difflabel::naming::NamingPattern;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut lines = text.lines();
    let Some(pattern) = lines.next() else {
        return;
    };
    let Ok(pattern) = NamingPattern::custom(pattern) else {
        return;
    };

    for name in lines {
        if let Some(found) = pattern.classify(name) {
            if pattern.policy().is_pure_serial() {
                assert!(found.base_name.is_none());
            }
        }
    }
});
