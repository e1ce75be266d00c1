#![no_main]

use arbitrary::Arbitrary;
use hddm_stream::{IStream, MemorySource, StreamConfig, StreamState};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct StreamInput {
    little_endian: bool,
    /// Младший полубайт: сжатие, старший: CRC
    flags: u8,
    body: Vec<u8>,
    skip: u8,
}

fuzz_target!(|input: StreamInput| {
    let mut bytes = b"HDDM\x01".to_vec();
    bytes.extend_from_slice(if input.little_endian {
        &[0xFF, 0xFE]
    } else {
        &[0xFE, 0xFF]
    });
    bytes.push(input.flags);
    bytes.extend_from_slice(&input.body);

    let config = StreamConfig {
        max_record_length: 1 << 20,
        ..Default::default()
    };
    let Ok(mut stream) = IStream::from_source(MemorySource::new(bytes), config) else {
        return;
    };

    let _ = stream.skip_records(u64::from(input.skip % 4));
    let mut errors = 0;
    while let Some(record) = stream.next() {
        match record {
            Ok(tree) => {
                for event in tree.events() {
                    let _ = event.run_number();
                    let _ = event.to_json();
                }
            }
            Err(_) => errors += 1,
        }
    }

    // Ошибка отдаётся не больше одного раза, после неё поток завершён.
    assert!(errors <= 1);
    assert!(matches!(
        stream.state(),
        StreamState::Exhausted | StreamState::Failed
    ));
});
