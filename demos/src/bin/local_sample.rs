//! Локальный контейнер: пропуск записей, возврат на позицию, JSON.

use std::io::Write;

use hddm_fixtures::{sample_run, Codec};
use hddm_stream::{
    logging::{init_logging, LoggingConfig},
    open, HddmResult, StreamConfig,
};

fn main() -> HddmResult<()> {
    init_logging(&LoggingConfig::from_verbosity(2, false))?;

    println!("=== HDDM local sample ===\n");

    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&sample_run(30_300, 5, 3).compression(Codec::Zstd).crc32().build())?;
    file.flush()?;
    let path = file.path().to_string_lossy().into_owned();

    let mut stream = open(&path, StreamConfig::default())?;
    if let Some(header) = stream.header() {
        println!(
            "header: version {}, {:?}, {:?}, {:?}",
            header.version as u8,
            header.byte_order,
            header.compression,
            header.integrity
        );
    }

    println!("skipped {} records", stream.skip_records(2)?);
    let Some(mark) = stream.position() else {
        return Ok(());
    };

    if let Some(record) = stream.next() {
        let record = record?;
        for event in record.events() {
            println!("{}", serde_json::to_string_pretty(&event.to_json()).unwrap_or_default());
        }
    }

    stream.set_position(mark)?;
    println!("\nreplaying from offset {}:", mark.offset);
    for record in stream.by_ref() {
        for event in record?.events() {
            println!("found run {}, event {}", event.run_number()?, event.event_number()?);
        }
    }

    println!(
        "\n{} records, {} bytes, state {}",
        stream.records_read(),
        stream.bytes_read(),
        stream.state()
    );
    Ok(())
}
