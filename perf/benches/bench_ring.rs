use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use shmchan_perf::{make_channel, make_payload};

const PAYLOAD: usize = 256;

fn bench_write_read(c: &mut Criterion) {
    let (_region, chan) = make_channel(1 << 16);
    let payload = make_payload(PAYLOAD);
    let mut out = vec![0u8; PAYLOAD];

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("write+read 256B", |b| {
        b.iter(|| {
            chan.write(&[black_box(&payload)]).expect("write failed");
            chan.read(black_box(&mut out), 0).expect("read failed");
        });
    });
    drop(group);
}

fn bench_gather_write(c: &mut Criterion) {
    let (_region, chan) = make_channel(1 << 16);
    let head = make_payload(24);
    let body = make_payload(PAYLOAD - 32);
    let tail = make_payload(8);
    let mut out = vec![0u8; PAYLOAD];

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("gather write (3 segments) + read", |b| {
        b.iter(|| {
            chan.write(&[black_box(&head), black_box(&body), black_box(&tail)])
                .expect("write failed");
            chan.read(black_box(&mut out), 0).expect("read failed");
        });
    });
    drop(group);
}

fn bench_peek(c: &mut Criterion) {
    let (_region, chan) = make_channel(1 << 16);
    let payload = make_payload(PAYLOAD);
    chan.write(&[&payload]).expect("prefill failed");
    let mut out = vec![0u8; PAYLOAD];

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));

    group.bench_function("peek 256B", |b| {
        b.iter(|| chan.peek(black_box(&mut out)).expect("peek failed"));
    });
    drop(group);
}

fn bench_debug_info(c: &mut Criterion) {
    let (_region, chan) = make_channel(1 << 16);

    let mut group = c.benchmark_group("ring");
    group.bench_function("debug_info", |b| {
        b.iter(|| black_box(chan.debug_info()));
    });
    drop(group);
}

criterion_group!(
    benches,
    bench_write_read,
    bench_gather_write,
    bench_peek,
    bench_debug_info
);
criterion_main!(benches);
