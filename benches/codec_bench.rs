//! Performance benchmarks for LineCodec.
//!
//! The station answers the reader while a person is holding a tag against
//! it, so decode plus encode must stay far below the serial latency floor.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use doorman_protocol::{HostCommand, LineCodec, parse_line};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

const UID_LINE: &str = "UID: EB-EE-C0-01";
const NOISE_LINE: &str = "rc522 init ok, antenna gain 0x04";

/// Benchmark parsing a well-formed UID report line.
fn bench_parse_uid_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_uid_line");
    group.throughput(Throughput::Elements(1));

    group.bench_function("uid_report", |b| {
        b.iter(|| {
            let event = parse_line(black_box(UID_LINE));
            black_box(event);
        });
    });

    group.finish();
}

/// Benchmark parsing firmware chatter that carries no event.
fn bench_parse_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_noise");
    group.throughput(Throughput::Elements(1));

    group.bench_function("boot_chatter", |b| {
        b.iter(|| {
            let event = parse_line(black_box(NOISE_LINE));
            black_box(event);
        });
    });

    group.finish();
}

/// Benchmark decoding batches of buffered lines.
fn bench_decode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));

        let mut wire = Vec::new();
        for i in 0..*batch_size {
            wire.extend_from_slice(format!("UID: {:02X}-A3-F2-5B\n", i % 256).as_bytes());
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, _| {
                b.iter(|| {
                    let mut codec = LineCodec::new();
                    let mut buffer = BytesMut::from(&wire[..]);
                    let mut count = 0;

                    while let Ok(Some(_)) = codec.decode(&mut buffer) {
                        count += 1;
                    }

                    black_box(count);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark encoding the reply commands.
fn bench_encode_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_commands");
    group.throughput(Throughput::Elements(1));

    group.bench_function("granted", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut buffer = BytesMut::new();
            codec
                .encode(black_box(HostCommand::Granted), &mut buffer)
                .unwrap();
            black_box(buffer);
        });
    });

    group.bench_function("confirm_with_name", |b| {
        let cmd = HostCommand::confirm_with_name("Ana Beatriz");
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut buffer = BytesMut::new();
            codec.encode(black_box(cmd.clone()), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

/// Benchmark the tap-to-reply hot path: decode one UID, encode one verdict.
fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.throughput(Throughput::Elements(1));

    let wire = format!("{UID_LINE}\n");

    group.bench_function("uid_to_verdict", |b| {
        b.iter(|| {
            let mut codec = LineCodec::new();
            let mut inbound = BytesMut::from(wire.as_bytes());
            let event = codec.decode(&mut inbound).unwrap();

            let mut outbound = BytesMut::new();
            codec
                .encode(black_box(HostCommand::Granted), &mut outbound)
                .unwrap();

            black_box((event, outbound));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_uid_line,
    bench_parse_noise,
    bench_decode_batch,
    bench_encode_commands,
    bench_roundtrip,
);

criterion_main!(benches);
