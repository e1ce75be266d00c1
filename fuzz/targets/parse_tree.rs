#![no_main]

use bytes::Bytes;
use hddm_stream::{
    format::{ByteOrder, FormatVersion},
    RawRecord, RecordTree,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (bool, Vec<u8>)| {
    let (little, payload) = data;
    let record = RawRecord {
        frame_len: payload.len() as u64 + 4,
        payload: Bytes::from(payload),
        offset: 8,
        index: 0,
        byte_order: if little {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        },
        version: FormatVersion::V1,
        inflated: false,
    };

    if let Ok(tree) = RecordTree::parse(record) {
        let root = tree.root();
        assert!(root.children().len() < tree.node_count());
        for child in root.children() {
            assert_eq!(child.parent().map(|p| p.id()), Some(root.id()));
        }
        for event in tree.events() {
            let _ = event.to_json();
        }
    }
});
