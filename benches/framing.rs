//! Benchmarks for frame recovery and packet decoding
//!
//! Covers the ingestion hot path that runs on every serial read:
//! - Framer throughput for typical and pathological chunk sizes
//! - Decode of a single frame into a 42-channel snapshot
//! - Full session feed including the pipeline handoff
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pmdstream::protocol::{FRAME_LENGTH, Framer, HEADER, PacketDecoder};
use pmdstream::session::DriverSession;
use pmdstream::test_utils::frame_stream;
use std::hint::black_box;

const FRAMES: usize = 1000;

fn bench_framer_chunking(c: &mut Criterion) {
    let stream = frame_stream(0, FRAMES);

    let mut group = c.benchmark_group("framer_chunking");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk_size in [1usize, 64, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut framer = Framer::new();
                let mut frames = 0usize;
                for chunk in stream.chunks(size) {
                    frames += framer.feed(black_box(chunk), |buffer, offset| {
                        black_box((buffer.len(), offset));
                    });
                }
                black_box(frames)
            })
        });
    }

    group.finish();
}

fn bench_resync_after_noise(c: &mut Criterion) {
    let mut stream = vec![0x55u8; 4096];
    stream.extend_from_slice(&frame_stream(0, 10));

    c.bench_function("framer_resync_after_noise", |b| {
        b.iter(|| {
            let mut framer = Framer::new();
            black_box(framer.feed(black_box(&stream), |_, _| {}))
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let frame = frame_stream(1, 1);
    assert_eq!(frame.len(), FRAME_LENGTH);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_frame", |b| {
        let mut decoder = PacketDecoder::new();
        let mut sample_index = 0u64;
        b.iter(|| {
            let decoded = decoder.decode(black_box(&frame), HEADER.len(), sample_index);
            sample_index += 1;
            black_box(decoded)
        })
    });

    group.finish();
}

fn bench_session_feed(c: &mut Criterion) {
    let stream = frame_stream(0, FRAMES);

    let mut group = c.benchmark_group("session_feed");
    group.throughput(Throughput::Elements(FRAMES as u64));

    group.bench_function("feed_and_handoff", |b| {
        b.iter(|| {
            let (session, mut receiver) = DriverSession::new(FRAMES);
            let frames: usize = stream.chunks(256).map(|chunk| session.feed(chunk)).sum();
            while receiver.try_recv().is_ok() {}
            black_box(frames)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_framer_chunking,
    bench_resync_after_noise,
    bench_decode,
    bench_session_feed
);
criterion_main!(benches);
