#![no_main]
use ferrotex_syntax::{extract_asset_keys, extract_cited_keys, parse_bibtex};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The scanners take &str; lossy conversion keeps "almost text" inputs.
    let s = String::from_utf8_lossy(data);
    let _ = parse_bibtex(&s);
    let _ = extract_cited_keys(&s);
    let _ = extract_asset_keys(&s);
});
