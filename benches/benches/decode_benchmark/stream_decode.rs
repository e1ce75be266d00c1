use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hddm_fixtures::{sample_run, Codec};
use hddm_stream::{FrameDecoder, FrameLimits, IStream, MemorySource, RecordTree, StreamConfig};

const RECORDS: usize = 200;
const EVENTS_PER_RECORD: usize = 10;

fn container(codec: Codec) -> Vec<u8> {
    sample_run(30_274, RECORDS, EVENTS_PER_RECORD)
        .compression(codec)
        .build()
}

/// Только фреймы: чтение длины, полезной нагрузки и распаковка.
fn bench_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames");
    for codec in [Codec::None, Codec::Zlib, Codec::Zstd] {
        let bytes = container(codec);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{codec:?}")),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let source = MemorySource::new(bytes.clone());
                    let mut decoder = FrameDecoder::open(source, FrameLimits::default()).unwrap();
                    let mut n = 0;
                    while let Some(record) = decoder.next_record().unwrap() {
                        n += black_box(record.payload.len());
                    }
                    n
                })
            },
        );
    }
    group.finish();
}

/// Разбор одной записи в дерево.
fn bench_tree_parse(c: &mut Criterion) {
    let bytes = container(Codec::None);
    let mut decoder = FrameDecoder::open(MemorySource::new(bytes), FrameLimits::default()).unwrap();
    let record = decoder.next_record().unwrap().unwrap();

    let mut group = c.benchmark_group("tree");
    group.throughput(Throughput::Bytes(record.payload.len() as u64));
    group.bench_function("parse_record", |b| {
        b.iter(|| RecordTree::parse(black_box(record.clone())).unwrap())
    });
    group.finish();
}

/// Полный путь: поток, дерево, номера ранов и событий.
fn bench_stream_events(c: &mut Criterion) {
    let bytes = container(Codec::Zstd);

    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Elements((RECORDS * EVENTS_PER_RECORD) as u64));
    group.bench_function("run_and_event_numbers", |b| {
        b.iter(|| {
            let stream =
                IStream::from_source(MemorySource::new(bytes.clone()), StreamConfig::default())
                    .unwrap();
            let mut sum = 0i64;
            for record in stream {
                let record = record.unwrap();
                for event in record.events() {
                    sum += event.run_number().unwrap() + event.event_number().unwrap();
                }
            }
            black_box(sum)
        })
    });
    group.bench_function("event_to_json", |b| {
        let mut stream =
            IStream::from_source(MemorySource::new(bytes.clone()), StreamConfig::default()).unwrap();
        let record = stream.next().unwrap().unwrap();
        b.iter(|| record.events().map(|e| black_box(e.to_json())).count())
    });
    group.finish();
}

criterion_group!(benches, bench_frames, bench_tree_parse, bench_stream_events);
criterion_main!(benches);
