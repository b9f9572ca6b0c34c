use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ostinato::{BundleScheduler, ReplyAddr, SLOT_COUNT};

fn benchmark_schedule_dispatch_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scheduler_Cycle");

    for fill in [16usize, 128, SLOT_COUNT].iter() {
        group.throughput(Throughput::Elements(*fill as u64));
        group.bench_with_input(BenchmarkId::new("add_pop_release", fill), fill, |b, &fill| {
            let mut sched: BundleScheduler = BundleScheduler::new();
            let payload = [0u8; 256];

            b.iter(|| {
                // Reverse-ordered tags force worst-case sorted insertion.
                for i in (0..fill as u64).rev() {
                    assert!(sched.add(i * 1000, &payload, ReplyAddr::default()));
                }
                while let Some(slot) = sched.pop() {
                    criterion::black_box(sched.slot(slot).payload());
                    sched.release(slot);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_peek(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scheduler_Peek");
    group.throughput(Throughput::Elements(1));

    group.bench_function("next_time_half_full", |b| {
        let mut sched: BundleScheduler = BundleScheduler::new();
        let payload = [0u8; 64];
        for i in 0..(SLOT_COUNT as u64 / 2) {
            sched.add(i, &payload, ReplyAddr::default());
        }
        b.iter(|| criterion::black_box(sched.next_time()));
    });

    group.finish();
}

criterion_group!(benches, benchmark_schedule_dispatch_cycle, benchmark_peek);
criterion_main!(benches);
