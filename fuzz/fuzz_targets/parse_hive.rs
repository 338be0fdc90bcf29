//! Mirrors libregf's `ossfuzz/file_fuzzer.cc`: wrap arbitrary bytes in an
//! in-memory byte source, open it as a hive, and walk the whole key/value
//! tree. The only assertion is that the core never panics — corrupted or
//! adversarial input must surface as `Err`/`Corruption`, not a crash.

#![no_main]

use libfuzzer_sys::fuzz_target;
use regf_core::source::SliceByteSource;
use regf_core::tree::{Hive, KeyHandle};
use regf_core::{ByteSource, HiveConfig};

fn walk<S: ByteSource>(key: &KeyHandle<'_, S>, depth: u32) {
    if depth > 64 {
        return;
    }
    if let Ok(values) = key.values() {
        for value in &values {
            let _ = value.resolve();
        }
    }
    if let Ok(children) = key.subkeys() {
        for child in &children {
            walk(child, depth + 1);
        }
    }
}

fuzz_target!(|data: &[u8]| {
    let source = SliceByteSource::new(data.to_vec());
    if let Ok(hive) = Hive::open_with_config(source, HiveConfig::default()) {
        if let Ok(root) = hive.root() {
            walk(&root, 0);
        }
        let _ = hive.find_by_path("Microsoft\\Windows\\CurrentVersion");
    }
});
