#![no_main]

use libfuzzer_sys::fuzz_target;
use tsdump_core::{decode_at, ChunkDecoder, MemorySource, XorDecoder};

fuzz_target!(|data: &[u8]| {
    // Arbitrary segment bytes: record framing, checksums and the XOR stream
    // must all fail cleanly on garbage.
    let source = MemorySource::new("fuzz", data.to_vec());

    for offset in [0u64, 8, data.len() as u64 / 2, u64::MAX] {
        if let Ok(record) = decode_at(&source, offset) {
            if let Ok(samples) = XorDecoder.decode(&record) {
                for sample in samples {
                    if sample.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Raw bytes as an XOR payload, skipping the framing and CRC
    let record = tsdump_core::ChunkRecord {
        encoding: tsdump_core::xor::ENCODING_XOR,
        payload: bytes::Bytes::copy_from_slice(data),
    };
    if let Ok(samples) = XorDecoder.decode(&record) {
        let _ = samples.take(1 << 16).count();
    }
});
