#![no_main]

use libfuzzer_sys::fuzz_target;
use tsdump_core::{IndexSource, MemorySource};
use tsdump_storage::IndexReader;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes as an index file. Header, TOC, symbol and postings
    // offset tables are parsed on open; postings and series lazily.
    let Ok(reader) = IndexReader::open(MemorySource::new("index", data.to_vec())) else {
        return;
    };

    let (name, value) = reader.all_postings_key();
    if let Ok(refs) = reader.postings(&name, &value) {
        for series in refs.into_iter().take(1024) {
            let _ = reader.series(series);
        }
    }
    for name in reader.label_names().into_iter().take(16) {
        let _ = reader.postings(name, "");
    }
    let _ = reader.series(u64::MAX);
});
