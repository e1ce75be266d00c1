#![no_main]

use hddm_stream::ContainerHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|bytes: [u8; 8]| {
    // Разобранный заголовок должен записываться обратно без потерь.
    if let Ok(header) = ContainerHeader::parse(&bytes) {
        assert_eq!(header.flags(), bytes[7]);
        assert_eq!(&bytes[0..4], b"HDDM");
    }
});
