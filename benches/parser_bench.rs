//! Performance benchmarks for the coin acceptor line parser.
//!
//! A listener tick drains whatever the serial driver buffered, so the
//! interesting numbers are single-line latency and whole-buffer throughput.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench parser_bench
//! ```

use coinbox_protocol::{LineBuffer, MessageParser};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// Build a buffer of `lines` messages mixing coins, heartbeats and noise.
fn create_buffer(lines: usize) -> Vec<u8> {
    let pattern = ["COIN:5.00", "HEARTBEAT", "STATUS:READY", "COIN:20", "garbage"];
    pattern
        .iter()
        .cycle()
        .take(lines)
        .flat_map(|line| format!("{line}\n").into_bytes())
        .collect()
}

/// Benchmark parsing a single coin line.
fn bench_parse_coin(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");
    group.throughput(Throughput::Elements(1));

    group.bench_function("coin", |b| {
        b.iter(|| black_box(MessageParser::parse(black_box("COIN:10.00"))));
    });

    group.bench_function("heartbeat", |b| {
        b.iter(|| black_box(MessageParser::parse(black_box("HEARTBEAT"))));
    });

    group.bench_function("rejected", |b| {
        b.iter(|| black_box(MessageParser::parse(black_box("COIN:150"))));
    });

    group.finish();
}

/// Benchmark parsing whole buffers of increasing size.
fn bench_parse_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_buffer");

    for lines in [1usize, 10, 100, 1000] {
        let buffer = create_buffer(lines);
        group.throughput(Throughput::Elements(lines as u64));

        group.bench_with_input(BenchmarkId::from_parameter(lines), &buffer, |b, buffer| {
            b.iter(|| black_box(MessageParser::parse_buffer(black_box(buffer))));
        });
    }

    group.finish();
}

/// Benchmark reassembling a buffer delivered in small reads.
fn bench_line_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_buffer");
    let buffer = create_buffer(100);
    group.throughput(Throughput::Elements(100));

    for chunk_size in [1usize, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("chunked", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut lines = LineBuffer::new();
                    let mut count = 0;
                    for chunk in buffer.chunks(chunk_size) {
                        lines.feed(chunk);
                        count += lines.drain_events().len();
                    }
                    black_box(count);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse_coin, bench_parse_buffer, bench_line_buffer);
criterion_main!(benches);
