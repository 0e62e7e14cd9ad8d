#![no_main]
use ferrotex_bundle::IncludeExpander;
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    // Every file of the bundle gets the same body, so any include is a cycle or a hit.
    let s = String::from_utf8_lossy(data);
    let sources: HashMap<String, String> = ["main.tex", "a.tex", "b/c.tex"]
        .into_iter()
        .map(|path| (path.to_string(), s.to_string()))
        .collect();
    let _ = IncludeExpander::new(&sources).with_max_depth(4).expand("main.tex", &s);
});
