use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ostinato::{
    layout::MAX_PAYLOAD,
    ring::{InboundReader, Pull},
    RingId, RingWriter, SharedRegion,
};

fn benchmark_write_drain_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ring_WriteDrain");

    for payload_size in [64usize, 256, 1024].iter() {
        group.throughput(Throughput::Bytes(*payload_size as u64 * 128));
        group.bench_with_input(
            BenchmarkId::new("inbound_128_frames", payload_size),
            payload_size,
            |b, &payload_size| {
                let region = SharedRegion::new().unwrap();
                let writer = RingWriter::new(&region, RingId::Inbound);
                let mut reader = InboundReader::new();
                let mut scratch = vec![0u8; MAX_PAYLOAD as usize];
                let payload = vec![0x5Au8; payload_size];

                b.iter(|| {
                    for _ in 0..128 {
                        assert!(writer.write(&payload));
                    }
                    loop {
                        match reader.pull(&region, &mut scratch) {
                            Pull::Frame(frame) => reader.commit(&region, &frame),
                            Pull::Empty => break,
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_reply_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ring_ReplyWriter");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_reply", |b| {
        let region = SharedRegion::new().unwrap();
        let writer = RingWriter::new(&region, RingId::Reply);
        let control = region.control();
        let payload = [0x42u8; 48];

        b.iter(|| {
            assert!(writer.write(&payload));
            // Consume immediately so the ring never fills.
            control.out_tail.store(
                control.out_head.load(std::sync::atomic::Ordering::Acquire),
                std::sync::atomic::Ordering::Release,
            );
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_write_drain_cycle, benchmark_reply_writes);
criterion_main!(benches);
