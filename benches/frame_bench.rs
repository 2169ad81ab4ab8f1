use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use devbridge::core::cobs;
use devbridge::core::codec::{FrameAssembler, FrameCodec};
use tokio_util::codec::{Decoder, Encoder};

fn sample(size: usize) -> Vec<u8> {
    // One zero every 97 bytes keeps runs short and frequent
    (0..size).map(|i| if i % 97 == 0 { 0 } else { (i % 251) as u8 }).collect()
}

#[allow(clippy::unwrap_used)]
fn bench_cobs(c: &mut Criterion) {
    let mut group = c.benchmark_group("cobs");
    let payload_sizes = [64usize, 512, 4096, 65536];

    for &size in &payload_sizes {
        let payload = sample(size);
        let stuffed = cobs::encode(&payload);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| b.iter(|| cobs::encode(&payload)));
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter(|| cobs::decode(&stuffed).unwrap())
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    let payload = sample(4096);

    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encode_decode_4096b", |b| {
        b.iter_batched(
            || BytesMut::with_capacity(cobs::max_encoded_len(payload.len()) + 1),
            |mut buf| {
                let mut codec = FrameCodec::default();
                codec.encode(payload.as_slice(), &mut buf).unwrap();
                let frame = codec.decode(&mut buf).unwrap().unwrap();
                cobs::decode(&frame).unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_assembler(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_assembler");
    let wire: Vec<u8> = (0..64).flat_map(|_| cobs::frame(&sample(900))).collect();

    for chunk in [16usize, 512, 6500] {
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(format!("chunks_of_{chunk}"), |b| {
            b.iter(|| {
                let mut assembler = FrameAssembler::new();
                let mut frames = 0;
                for piece in wire.chunks(chunk) {
                    frames += assembler.push(piece).len();
                }
                assert_eq!(frames, 64);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cobs, bench_codec, bench_assembler);
criterion_main!(benches);
