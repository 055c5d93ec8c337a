//! Fuzz target for applying JSON config updates.
//!
//! Arbitrary JSON is applied on top of the default diff config. A rejected
//! update must leave the config untouched.

#![no_main]

use difflabel::config::DiffConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let mut config = DiffConfig::default();
    if config.apply_json(&value).is_err() {
        assert_eq!(config, DiffConfig::default());
    }
    let _ = config.validate();
});
