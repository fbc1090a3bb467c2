use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};

use tradenet::channel::{decode, encode};
use tradenet::message::{ApplicationMessage, BundleOfEnvelopes, NetworkEnvelope, Payload, Ping};

fn application(size: usize) -> NetworkEnvelope {
    NetworkEnvelope::new(Payload::Application(ApplicationMessage::new("OfferPayload", vec![7u8; size])))
}

fn bundle(count: usize) -> NetworkEnvelope {
    let envelopes = (0..count as u32).map(|nonce| NetworkEnvelope::new(Payload::Ping(Ping::new(nonce, 0))));
    NetworkEnvelope::new(Payload::Bundle(BundleOfEnvelopes::new(envelopes.collect())))
}

pub fn run_codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_benchmark");
    let sizes = vec![100, 10_000, 1_000_000];

    encode_benchmark(&mut group, sizes.clone());
    decode_benchmark(&mut group, sizes);
    bundle_benchmark(&mut group, vec![10, 100, 1000]);

    group.finish();
}

fn encode_benchmark(group: &mut BenchmarkGroup<WallTime>, sizes: Vec<usize>) {
    for size in sizes {
        let envelope = application(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &envelope, |b, envelope| {
            b.iter(|| encode(black_box(envelope)).unwrap())
        });
    }
}

fn decode_benchmark(group: &mut BenchmarkGroup<WallTime>, sizes: Vec<usize>) {
    for size in sizes {
        let frame = encode(&application(size)).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, frame| {
            b.iter(|| decode(black_box(frame)).unwrap())
        });
    }
}

fn bundle_benchmark(group: &mut BenchmarkGroup<WallTime>, counts: Vec<usize>) {
    for count in counts {
        let frame = encode(&bundle(count)).unwrap();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("decode_bundle", count), &frame, |b, frame| {
            b.iter(|| decode(black_box(frame)).unwrap())
        });
    }
}

criterion_group!(benches, run_codec_benchmark);
criterion_main!(benches);
